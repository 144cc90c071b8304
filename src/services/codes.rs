use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::oneshot;
use uuid::Uuid;

use super::{RequestHandler, Service, ServiceError};
use crate::{
    models::{
        codes::{CodeOwner, CouponStatus, NewCodes, PromoCode},
        ledger::LedgerError,
    },
    repositories::{CodeStore, RedemptionTerms, RepositoryError, UserStore},
};

pub const MAX_CODES_PER_BATCH: u32 = 1000;

pub enum CodeRequest {
    Generate {
        request: NewCodes,
        response: oneshot::Sender<Result<Vec<String>, ServiceError>>,
    },
    Redeem {
        user_id: String,
        code: String,
        response: oneshot::Sender<Result<PromoCode, ServiceError>>,
    },
    List {
        response: oneshot::Sender<Result<Vec<PromoCode>, ServiceError>>,
    },
    RedeemedBy {
        user_id: String,
        response: oneshot::Sender<Result<Vec<PromoCode>, ServiceError>>,
    },
    Owner {
        code: String,
        response: oneshot::Sender<Result<CodeOwner, ServiceError>>,
    },
    Remove {
        id: String,
        response: oneshot::Sender<Result<PromoCode, ServiceError>>,
    },
    CouponStatus {
        code: String,
        user_id: String,
        response: oneshot::Sender<Result<CouponStatus, ServiceError>>,
    },
}

/// `tokio::time::interval` panics on a zero period.
fn anniversary_period(every: Duration) -> Duration {
    every.max(Duration::from_secs(1))
}

#[derive(Clone)]
pub struct CodeRequestHandler {
    codes: Arc<dyn CodeStore>,
    users: Arc<dyn UserStore>,
    terms: RedemptionTerms,
    anniversary_grant: i32,
}

impl CodeRequestHandler {
    pub fn new(
        codes: Arc<dyn CodeStore>,
        users: Arc<dyn UserStore>,
        terms: RedemptionTerms,
        anniversary_grant: i32,
    ) -> Self {
        CodeRequestHandler {
            codes,
            users,
            terms,
            anniversary_grant,
        }
    }

    /// Runs the monthly anniversary pass every `every`, for as long as the
    /// runtime lives.
    pub fn start_anniversary_task(&self, every: Duration) {
        let handler = self.clone();
        let every = anniversary_period(every);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;

                let today = chrono::Utc::now().date_naive();
                match handler.run_anniversary_grants(today).await {
                    Ok(0) => log::debug!("No anniversary grants due on {}.", today),
                    Ok(granted) => log::info!("Granted {} anniversary bonuses on {}.", granted, today),
                    Err(e) => log::error!("Anniversary pass failed: {}", e),
                }
            }
        });
    }

    /// Pays every redeemed code whose anniversary is `today`. Codes already
    /// paid today are skipped, so the pass can run any number of times.
    pub async fn run_anniversary_grants(&self, today: NaiveDate) -> Result<u32, ServiceError> {
        let mut granted = 0;

        for code in self.codes.list_codes().await? {
            if !code.anniversary_due(today) {
                continue;
            }

            match self
                .codes
                .grant_anniversary(&code.id, today, self.anniversary_grant)
                .await
            {
                Ok(true) => granted += 1,
                Ok(false) => {}
                Err(e) => log::warn!("Anniversary grant for code {} failed: {}", code.id, e),
            }
        }

        Ok(granted)
    }

    async fn generate(&self, request: NewCodes) -> Result<Vec<String>, ServiceError> {
        if request.platform.trim().is_empty() {
            return Err(ServiceError::BadRequest("Platform is required".to_string()));
        }
        if request.codes_amount == 0 || request.codes_amount > MAX_CODES_PER_BATCH {
            return Err(ServiceError::BadRequest(format!(
                "Codes amount must be between 1 and {MAX_CODES_PER_BATCH}"
            )));
        }

        let codes = (0..request.codes_amount)
            .map(|_| Uuid::new_v4().hyphenated().to_string())
            .collect();
        let stored = self
            .codes
            .insert_codes(request.platform.trim(), codes)
            .await?;

        log::info!("Generated {} codes for {}.", stored.len(), request.platform);
        Ok(stored.into_iter().map(|promo| promo.code).collect())
    }

    async fn redeem(&self, user_id: &str, code: &str) -> Result<PromoCode, ServiceError> {
        let now = chrono::Utc::now().naive_utc();
        let promo = self
            .codes
            .redeem_code(user_id, code, now, self.terms)
            .await
            .map_err(|e| match e {
                // Unknown and used codes read the same to the caller.
                RepositoryError::NotFound("Code") => {
                    ServiceError::from(LedgerError::CodeAlreadyRedeemed)
                }
                other => ServiceError::from(other),
            })?;

        log::info!("User {} redeemed code {}.", user_id, promo.id);
        Ok(promo)
    }

    async fn list(&self) -> Result<Vec<PromoCode>, ServiceError> {
        Ok(self.codes.list_codes().await?)
    }

    async fn redeemed_by(&self, user_id: &str) -> Result<Vec<PromoCode>, ServiceError> {
        Ok(self.codes.redeemed_by(user_id).await?)
    }

    async fn owner(&self, code: &str) -> Result<CodeOwner, ServiceError> {
        let promo = self
            .codes
            .find_code(code)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Code not found".to_string()))?;

        let user = match promo.user_id {
            Some(user_id) => self
                .users
                .get_user_by_id(&user_id)
                .await?
                .map(|user| user.summary()),
            None => None,
        };

        Ok(CodeOwner { user })
    }

    async fn remove(&self, id: &str) -> Result<PromoCode, ServiceError> {
        let removed = self.codes.delete_code(id).await?;

        log::info!("Removed code {}.", removed.id);
        Ok(removed)
    }

    async fn coupon_status(&self, code: &str, user_id: &str) -> Result<CouponStatus, ServiceError> {
        let found = self.codes.find_code(code).await?;

        Ok(CouponStatus::for_user(code, found.as_ref(), user_id))
    }
}

#[async_trait]
impl RequestHandler<CodeRequest> for CodeRequestHandler {
    async fn handle_request(&self, request: CodeRequest) {
        match request {
            CodeRequest::Generate { request, response } => {
                let _ = response.send(self.generate(request).await);
            }
            CodeRequest::Redeem {
                user_id,
                code,
                response,
            } => {
                let _ = response.send(self.redeem(&user_id, &code).await);
            }
            CodeRequest::List { response } => {
                let _ = response.send(self.list().await);
            }
            CodeRequest::RedeemedBy { user_id, response } => {
                let _ = response.send(self.redeemed_by(&user_id).await);
            }
            CodeRequest::Owner { code, response } => {
                let _ = response.send(self.owner(&code).await);
            }
            CodeRequest::Remove { id, response } => {
                let _ = response.send(self.remove(&id).await);
            }
            CodeRequest::CouponStatus {
                code,
                user_id,
                response,
            } => {
                let _ = response.send(self.coupon_status(&code, &user_id).await);
            }
        }
    }
}

pub struct CodeService;

impl CodeService {
    pub fn new() -> Self {
        CodeService {}
    }
}

#[async_trait]
impl Service<CodeRequest, CodeRequestHandler> for CodeService {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::memory::MemoryStore;
    use rstest::rstest;

    fn handler(store: Arc<MemoryStore>) -> CodeRequestHandler {
        CodeRequestHandler::new(
            store.clone(),
            store,
            RedemptionTerms {
                grant: 50,
                max_codes: 5,
            },
            50,
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case(0)]
    #[case(1001)]
    #[tokio::test]
    async fn batch_size_is_bounded(#[case] amount: u32) {
        let result = handler(Arc::new(MemoryStore::new()))
            .generate(NewCodes {
                platform: "appsumo".to_string(),
                codes_amount: amount,
            })
            .await;

        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn generated_codes_are_unique_and_unredeemed() {
        let handler = handler(Arc::new(MemoryStore::new()));

        let codes = handler
            .generate(NewCodes {
                platform: "appsumo".to_string(),
                codes_amount: 3,
            })
            .await
            .unwrap();
        assert_eq!(codes.len(), 3);
        assert_ne!(codes[0], codes[1]);

        let listed = handler.list().await.unwrap();
        assert_eq!(listed.len(), 3);
        assert!(listed.iter().all(|code| !code.is_redeemed() && code.platform == "appsumo"));
    }

    #[tokio::test]
    async fn code_redeems_once() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 1);
        let bob = store.seed_user("bob@example.com", 1);
        store.seed_codes("appsumo", &["abc"]);
        let handler = handler(store.clone());

        let promo = handler.redeem(&ada.id, "abc").await.unwrap();
        assert_eq!(promo.user_id.as_deref(), Some(ada.id.as_str()));
        assert_eq!(store.credits(&ada.id), 51);

        let again = handler.redeem(&bob.id, "abc").await;
        assert!(
            matches!(again, Err(ServiceError::NotFound(ref m)) if m == "Code not found or already redeemed")
        );
        assert_eq!(store.credits(&bob.id), 1);

        let unknown = handler.redeem(&bob.id, "zzz").await;
        assert!(
            matches!(unknown, Err(ServiceError::NotFound(ref m)) if m == "Code not found or already redeemed")
        );
    }

    #[tokio::test]
    async fn sixth_code_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 0);
        store.seed_codes("appsumo", &["c1", "c2", "c3", "c4", "c5", "c6"]);
        let handler = handler(store.clone());

        for code in ["c1", "c2", "c3", "c4", "c5"] {
            handler.redeem(&ada.id, code).await.unwrap();
        }
        let sixth = handler.redeem(&ada.id, "c6").await;

        assert!(matches!(sixth, Err(ServiceError::BadRequest(_))));
        assert_eq!(store.credits(&ada.id), 250);
        assert!(!store.find_code("c6").await.unwrap().unwrap().is_redeemed());
        assert_eq!(handler.redeemed_by(&ada.id).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn owner_and_coupon_views() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 0);
        store.seed_codes("appsumo", &["abc", "def"]);
        let handler = handler(store);
        handler.redeem(&ada.id, "abc").await.unwrap();

        let owner = handler.owner("abc").await.unwrap();
        assert_eq!(owner.user.map(|user| user.id), Some(ada.id.clone()));
        assert!(handler.owner("def").await.unwrap().user.is_none());
        assert!(matches!(handler.owner("zzz").await, Err(ServiceError::NotFound(_))));

        let status = handler.coupon_status("abc", &ada.id).await.unwrap();
        assert!(status.exists && status.redeemed && status.redeemed_by_you);
        let status = handler.coupon_status("def", &ada.id).await.unwrap();
        assert!(status.exists && !status.redeemed);
    }

    #[tokio::test]
    async fn removing_a_code_detaches_it() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 0);
        store.seed_codes("appsumo", &["abc"]);
        let handler = handler(store.clone());
        let promo = handler.redeem(&ada.id, "abc").await.unwrap();

        handler.remove(&promo.id).await.unwrap();

        assert!(handler.redeemed_by(&ada.id).await.unwrap().is_empty());
        assert!(store.get_user_details(&ada.id).await.unwrap().unwrap().ltd_codes.is_empty());
        assert!(matches!(handler.remove(&promo.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn anniversary_pass_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let ada = store.seed_user("ada@example.com", 0);
        store.seed_codes("appsumo", &["abc", "unused"]);
        let redeemed_at = date(2024, 1, 15).and_hms_opt(9, 30, 0).unwrap();
        store
            .redeem_code(
                &ada.id,
                "abc",
                redeemed_at,
                RedemptionTerms {
                    grant: 50,
                    max_codes: 5,
                },
            )
            .await
            .unwrap();
        let handler = handler(store.clone());

        assert_eq!(handler.run_anniversary_grants(date(2024, 1, 15)).await.unwrap(), 0);
        assert_eq!(handler.run_anniversary_grants(date(2024, 2, 14)).await.unwrap(), 0);
        assert_eq!(store.credits(&ada.id), 50);

        assert_eq!(handler.run_anniversary_grants(date(2024, 2, 15)).await.unwrap(), 1);
        assert_eq!(handler.run_anniversary_grants(date(2024, 2, 15)).await.unwrap(), 0);
        assert_eq!(store.credits(&ada.id), 100);

        assert_eq!(handler.run_anniversary_grants(date(2024, 3, 15)).await.unwrap(), 1);
        assert_eq!(store.credits(&ada.id), 150);
    }

    #[rstest]
    #[case(Duration::ZERO, Duration::from_secs(1))]
    #[case(Duration::from_millis(10), Duration::from_secs(1))]
    #[case(Duration::from_secs(3600), Duration::from_secs(3600))]
    fn anniversary_period_is_never_zero(#[case] every: Duration, #[case] expected: Duration) {
        assert_eq!(anniversary_period(every), expected);
    }
}
