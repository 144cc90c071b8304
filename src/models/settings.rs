use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const DEFAULT_PROMPT: &str = r#"Output must be in JSON format.

You are a multilingual fact-checking assistant. For the text you receive:
1. Detect its language and answer in that same language.
2. Fact-check the claims it makes, and nothing else.
3. Find 5 to 10 reliable sources from distinct domains that are strictly related
   to the subject. Never invent a source.
4. Judge how well the sources support the text: True, False, Half true or Misleading.
5. Rate the severity of any inaccuracy: Low, Medium or High.
6. Explain the accuracy of the claim and its context in 200 to 300 words.
7. Summarize the key facts that support or refute the claim.

Answer with a single JSON object using exactly this template:
{
  "factCheckDetails": {
    "explanation": "",
    "truthStatus": "",
    "severity": "",
    "keyFacts": [],
    "references": [{"title": "", "url": ""}]
  }
}"#;

/// The stored, admin-editable fact-check settings. A single row.
#[derive(Clone, Debug, Deserialize, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRecord {
    pub api_key: Option<String>,
    pub prompt: Option<String>,
    pub version: i32,
    pub updated_at: NaiveDateTime,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub api_key: Option<String>,
    pub prompt: Option<String>,
}

/// Values the fact-check pipeline uses when no settings row overrides them.
#[derive(Clone, Debug)]
pub struct FactCheckDefaults {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub prompt: String,
}

/// Snapshot of the effective fact-check configuration, handed to a single
/// submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactCheckConfig {
    pub url: String,
    pub model: String,
    pub api_key: String,
    pub prompt: String,
    pub version: i32,
}

impl FactCheckConfig {
    pub fn resolve(defaults: &FactCheckDefaults, record: Option<&SettingsRecord>) -> Self {
        let pick = |stored: Option<&String>, fallback: &String| {
            stored
                .filter(|value| !value.trim().is_empty())
                .unwrap_or(fallback)
                .clone()
        };

        FactCheckConfig {
            url: defaults.url.clone(),
            model: defaults.model.clone(),
            api_key: pick(record.and_then(|r| r.api_key.as_ref()), &defaults.api_key),
            prompt: pick(record.and_then(|r| r.prompt.as_ref()), &defaults.prompt),
            version: record.map(|r| r.version).unwrap_or(0),
        }
    }
}
