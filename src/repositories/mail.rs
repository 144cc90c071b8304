use async_trait::async_trait;
use serde::Serialize;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct Mail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), anyhow::Error>;
}

/// Delivers mail through an HTTP relay that accepts a JSON message.
pub struct MailRelayApi {
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl MailRelayApi {
    pub fn new(url: &str, api_key: &str) -> Self {
        Self {
            url: url.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Mailer for MailRelayApi {
    async fn send(&self, mail: Mail) -> Result<(), anyhow::Error> {
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Mail relay: status {} => {}", status, body);
        }

        log::info!("Mail \"{}\" sent to {}", mail.subject, mail.to);
        Ok(())
    }
}

/// Builds the password reset message for `to`.
pub fn password_reset_mail(from: &str, to: &str, link: &str) -> Mail {
    Mail {
        from: from.to_string(),
        to: to.to_string(),
        subject: "Factify password reset".to_string(),
        text: format!(
            "Someone asked to reset the password of your Factify account.\n\n\
             Open this link within one hour to choose a new password:\n{link}\n\n\
             If it was not you, ignore this message."
        ),
        html: format!(
            "<p>Someone asked to reset the password of your Factify account.</p>\
             <p><a href=\"{link}\">Choose a new password</a>. The link expires in one hour.</p>\
             <p>If it was not you, ignore this message.</p>"
        ),
    }
}
