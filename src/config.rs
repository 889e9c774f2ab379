use rocket::figment::Figment;
use rocket::figment::providers::{Env, Serialized};
use serde::{Deserialize, Serialize};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://sar-training.db";
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 168;

/// Application settings that live next to Rocket's own (`address`, `port`,
/// `secret_key`) in the same figment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    pub database_url: String,
    pub token_ttl_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            token_ttl_hours: DEFAULT_TOKEN_TTL_HOURS,
        }
    }
}

impl AppConfig {
    /// Rocket's figment (Rocket.toml + `ROCKET_*`) layered with the
    /// application defaults and the unprefixed `DATABASE_URL` /
    /// `TOKEN_TTL_HOURS` variables.
    pub fn figment() -> Figment {
        rocket::Config::figment()
            .join(Serialized::defaults(AppConfig::default()))
            .merge(Env::raw().only(&["database_url", "token_ttl_hours"]))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, rocket::figment::Error> {
        let config: AppConfig = figment.extract()?;
        if config.token_ttl_hours <= 0 {
            return Err(rocket::figment::Error::from(format!(
                "token_ttl_hours must be positive, got {}",
                config.token_ttl_hours
            )));
        }
        Ok(config)
    }
}
