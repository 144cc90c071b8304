use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub listen: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postgres {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Auth {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    /// Accounts registered with one of these emails become admins.
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credits {
    #[serde(default = "default_grant")]
    pub signup: i32,
    #[serde(default = "default_grant")]
    pub redemption_grant: i32,
    #[serde(default = "default_grant")]
    pub anniversary_grant: i32,
    #[serde(default = "default_max_codes")]
    pub max_codes_per_user: usize,
    #[serde(default = "default_anniversary_check_secs")]
    pub anniversary_check_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FactCheck {
    pub url: String,
    pub api_key: String,
    pub model: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: i64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mail {
    pub url: String,
    pub api_key: String,
    pub from: String,
    /// Base of the link mailed for password resets; the token is appended.
    pub reset_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: Server,
    pub postgres: Postgres,
    pub auth: Auth,
    pub credits: Credits,
    pub fact_check: FactCheck,
    pub mail: Mail,
}

fn default_max_connections() -> u32 {
    5
}

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_grant() -> i32 {
    50
}

fn default_max_codes() -> usize {
    5
}

fn default_anniversary_check_secs() -> u64 {
    60 * 60
}

fn default_history_limit() -> i64 {
    15
}

fn default_timeout_secs() -> u64 {
    60
}

impl Settings {
    /// Reads `path`, then lets `FACTIFY__SECTION__KEY` variables override it.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("FACTIFY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.admin_emails")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        if settings.credits.anniversary_check_secs == 0 {
            return Err(ConfigError::Message(
                "credits.anniversary_check_secs must be at least 1".to_string(),
            ));
        }

        Ok(settings)
    }
}
