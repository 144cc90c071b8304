use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::ledger::LedgerError;
use super::users::UserSummary;

/// A single-use promotional (LTD) code.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
pub struct PromoCode {
    pub id: String,
    pub code: String,
    pub platform: String,
    pub user_id: Option<String>,
    pub used_at: Option<NaiveDateTime>,
    pub last_grant_on: Option<NaiveDate>,
    pub created_at: NaiveDateTime,
}

impl PromoCode {
    pub fn is_redeemed(&self) -> bool {
        self.user_id.is_some()
    }

    pub fn redeem(&mut self, user_id: &str, now: NaiveDateTime) -> Result<(), LedgerError> {
        if self.is_redeemed() {
            return Err(LedgerError::CodeAlreadyRedeemed);
        }

        self.user_id = Some(user_id.to_string());
        self.used_at = Some(now);
        Ok(())
    }

    /// True when the monthly credit grant for this code should run on `today`
    /// and has not already run on that date.
    pub fn anniversary_due(&self, today: NaiveDate) -> bool {
        let Some(used_at) = self.used_at else {
            return false;
        };
        if self.user_id.is_none() || self.last_grant_on == Some(today) {
            return false;
        }

        is_monthly_anniversary(used_at.date(), today)
    }
}

/// Same day of month, at least one calendar month later. Codes redeemed on
/// the 29th-31st skip the months that lack that day.
pub fn is_monthly_anniversary(applied: NaiveDate, today: NaiveDate) -> bool {
    if applied.day() != today.day() {
        return false;
    }

    let months_elapsed = (today.year() - applied.year()) * 12 + today.month() as i32
        - applied.month() as i32;
    months_elapsed >= 1
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCodes {
    pub platform: String,
    pub codes_amount: u32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CodeOwner {
    pub user: Option<UserSummary>,
}

/// How a coupon looks from the point of view of one user.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct CouponStatus {
    pub code: String,
    pub exists: bool,
    pub platform: Option<String>,
    pub redeemed: bool,
    pub redeemed_by_you: bool,
}

impl CouponStatus {
    pub fn for_user(code: &str, found: Option<&PromoCode>, user_id: &str) -> Self {
        match found {
            Some(promo) => CouponStatus {
                code: promo.code.clone(),
                exists: true,
                platform: Some(promo.platform.clone()),
                redeemed: promo.is_redeemed(),
                redeemed_by_you: promo.user_id.as_deref() == Some(user_id),
            },
            None => CouponStatus {
                code: code.to_string(),
                exists: false,
                platform: None,
                redeemed: false,
                redeemed_by_you: false,
            },
        }
    }
}
