use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL; the in-memory store is used when unset.
    pub database_url: Option<String>,
    pub risk_model_path: PathBuf,
    pub port: u16,
    pub telegram: Option<TelegramConfig>,
    pub whatsapp: Option<WhatsAppConfig>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub hazard_timeout: Duration,
    pub advisor_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token`; unchecked when unset.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub access_token: String,
    pub phone_number_id: String,
    pub verify_token: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let telegram = non_empty("TELEGRAM_BOT_TOKEN").map(|bot_token| TelegramConfig {
            bot_token,
            webhook_secret: non_empty("TELEGRAM_WEBHOOK_SECRET"),
        });

        let whatsapp = match non_empty("WHATSAPP_TOKEN") {
            Some(access_token) => Some(WhatsAppConfig {
                access_token,
                phone_number_id: non_empty("WHATSAPP_PHONE_NUMBER_ID")
                    .context("WHATSAPP_PHONE_NUMBER_ID must be set when WHATSAPP_TOKEN is")?,
                verify_token: non_empty("WHATSAPP_VERIFY_TOKEN")
                    .context("WHATSAPP_VERIFY_TOKEN must be set when WHATSAPP_TOKEN is")?,
            }),
            None => None,
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            risk_model_path: env::var("RISK_MODEL_PATH")
                .unwrap_or_else(|_| "data/risk_model.json".to_string())
                .into(),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            telegram,
            whatsapp,
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
            hazard_timeout: secs("HAZARD_TIMEOUT_SECS", 20)?,
            advisor_timeout: secs("ADVISOR_TIMEOUT_SECS", 30)?,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn secs(key: &str, default: u64) -> Result<Duration> {
    let secs = match env::var(key) {
        Ok(v) => v
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        Err(_) => default,
    };
    anyhow::ensure!(secs > 0, "{key} must be positive");
    Ok(Duration::from_secs(secs))
}
