use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::{
    facts::{FactVerdict, Reference},
    settings::FactCheckConfig,
};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FactChecker: Send + Sync {
    async fn check(&self, config: &FactCheckConfig, claim: &str) -> Result<FactVerdict, anyhow::Error>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Client for an OpenAI-style chat completion endpoint.
pub struct CompletionApi {
    client: reqwest::Client,
}

impl CompletionApi {
    pub fn new(timeout: Duration) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FactChecker for CompletionApi {
    async fn check(&self, config: &FactCheckConfig, claim: &str) -> Result<FactVerdict, anyhow::Error> {
        let payload = json!({
            "model": config.model,
            "messages": [
                { "role": "system", "content": config.prompt },
                { "role": "user", "content": claim }
            ]
        });

        let response = self
            .client
            .post(&config.url)
            .bearer_auth(&config.api_key)
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            bail!("Fact-check API: status {} => {}", status, body);
        }

        let completion: CompletionResponse = serde_json::from_str(&body)?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| anyhow!("Fact-check API: Bad response format."))?;

        log::debug!("Fact-check API content (settings v{}): {}", config.version, content);
        parse_verdict(&content)
    }
}

/// Returns the span from the first `{` to the last `}` of a completion.
pub fn extract_json_object(content: &str) -> Option<&str> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;

    (end > start).then(|| &content[start..=end])
}

pub fn parse_verdict(content: &str) -> Result<FactVerdict, anyhow::Error> {
    let object = extract_json_object(content)
        .ok_or_else(|| anyhow!("Fact-check API: no JSON object in completion."))?;
    let value: Value = serde_json::from_str(object)?;
    let details = value
        .get("factCheckDetails")
        .or_else(|| value.get("fact_check_details"))
        .unwrap_or(&value);

    let truth_status = text_field(details, &["truthStatus", "truth_status"])
        .filter(|status| !status.is_empty())
        .ok_or_else(|| anyhow!("Fact-check API: verdict has no truth status."))?;

    Ok(FactVerdict {
        truth_status,
        severity: text_field(details, &["severity"]).unwrap_or_default(),
        explanation: text_field(details, &["explanation"]).unwrap_or_default(),
        key_facts: key_facts(details),
        references: references(details),
    })
}

fn field<'a>(details: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| details.get(*name))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    }
}

fn text_field(details: &Value, names: &[&str]) -> Option<String> {
    field(details, names).and_then(scalar_text)
}

fn key_facts(details: &Value) -> Vec<String> {
    match field(details, &["keyFacts", "key_facts"]) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(scalar_text)
            .filter(|fact| !fact.is_empty())
            .collect(),
        Some(Value::String(text)) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn references(details: &Value) -> Vec<Reference> {
    match field(details, &["references", "sources"]) {
        Some(Value::Array(items)) => items.iter().filter_map(reference).collect(),
        _ => Vec::new(),
    }
}

fn reference(value: &Value) -> Option<Reference> {
    match value {
        Value::String(text) => Some(markdown_link(text).unwrap_or_else(|| Reference {
            title: text.trim().to_string(),
            url: text.trim().to_string(),
        })),
        Value::Object(map) => {
            if let Some(url) = map.get("url").and_then(Value::as_str) {
                let title = map.get("title").and_then(Value::as_str).unwrap_or(url);
                return Some(Reference {
                    title: title.to_string(),
                    url: url.to_string(),
                });
            }

            // {"Some title": "https://..."}
            let mut entries = map.iter();
            match (entries.next(), entries.next()) {
                (Some((title, Value::String(url))), None) => Some(Reference {
                    title: title.clone(),
                    url: url.clone(),
                }),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Parses `[title](url)`.
fn markdown_link(text: &str) -> Option<Reference> {
    let text = text.trim();
    let rest = text.strip_prefix('[')?;
    let (title, rest) = rest.split_once("](")?;
    let url = rest.strip_suffix(')')?;

    Some(Reference {
        title: title.to_string(),
        url: url.to_string(),
    })
}
