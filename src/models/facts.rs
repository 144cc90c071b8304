use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Reference {
    pub title: String,
    pub url: String,
}

/// Verdict returned by the fact-checking API for one claim.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FactVerdict {
    pub truth_status: String,
    pub severity: String,
    pub explanation: String,
    pub key_facts: Vec<String>,
    pub references: Vec<Reference>,
}

#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Fact {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub truth_status: String,
    pub severity: String,
    pub explanation: String,
    pub key_facts: Vec<String>,
    pub references: Json<Vec<Reference>>,
    pub created_at: NaiveDateTime,
}

#[derive(Clone, Debug)]
pub struct NewFact {
    pub user_id: String,
    pub title: String,
    pub verdict: FactVerdict,
}

/// A fact as listed to one user, flagged with whether that user favorited it.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactView {
    #[serde(flatten)]
    pub fact: Fact,
    pub is_favorite: bool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FactWithFavorites {
    #[serde(flatten)]
    pub fact: Fact,
    pub favorite_users: Vec<String>,
}
