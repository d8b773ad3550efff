//! Server configuration from flags and environment

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sqlx::sqlite::SqliteConnectOptions;

use crate::error::Result;
use crate::notify::telegram::DEFAULT_API_URL;
use crate::notify::{LogTransport, MessageTransport, TelegramTransport};
use crate::rules::{ApprovalRules, RulesError};

#[derive(Debug, Clone, Parser)]
#[command(name = "procurement", version, about = "Procurement workflow server")]
pub struct Config {
    /// SQLite connection string
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:procurement.db?mode=rwc"
    )]
    pub database_url: String,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,

    /// Seconds a writer waits for the database lock before failing
    #[arg(long, env = "DB_BUSY_TIMEOUT_SECS", default_value_t = 5)]
    pub busy_timeout_secs: u64,

    /// Address to listen on
    #[arg(long = "bind", env = "BIND_ADDR", default_value = "0.0.0.0:3000")]
    pub bind_addr: SocketAddr,

    /// JSON approval rule table; built-in defaults when omitted
    #[arg(long = "rules", env = "APPROVAL_RULES")]
    pub rules_path: Option<PathBuf>,

    /// Telegram bot token; without it notifications are only logged
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    #[arg(long = "telegram-api", env = "TELEGRAM_API_URL", default_value = DEFAULT_API_URL)]
    pub telegram_api_url: String,
}

impl Config {
    pub fn connect_options(&self) -> std::result::Result<SqliteConnectOptions, sqlx::Error> {
        Ok(SqliteConnectOptions::from_str(&self.database_url)?
            .busy_timeout(Duration::from_secs(self.busy_timeout_secs)))
    }

    pub fn load_rules(&self) -> std::result::Result<ApprovalRules, RulesError> {
        match &self.rules_path {
            Some(path) => ApprovalRules::load(path),
            None => Ok(ApprovalRules::default()),
        }
    }

    pub fn transport(&self) -> Result<Arc<dyn MessageTransport>> {
        match self.telegram_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => Ok(Arc::new(TelegramTransport::new(
                &self.telegram_api_url,
                token,
            )?)),
            None => {
                tracing::warn!("TELEGRAM_BOT_TOKEN not set, notifications will only be logged");
                Ok(Arc::new(LogTransport))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["procurement"]).unwrap();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.telegram_api_url, DEFAULT_API_URL);
        assert!(config.rules_path.is_none());
        assert_eq!(config.load_rules().unwrap().payment_followup_days, 14);
        assert_eq!(config.busy_timeout_secs, 5);
        assert!(config.connect_options().is_ok());
    }

    #[test]
    fn test_flags() {
        let config = Config::try_parse_from([
            "procurement",
            "--bind",
            "127.0.0.1:8080",
            "--database-url",
            "sqlite::memory:",
            "--telegram-token",
            "123:abc",
            "--busy-timeout-secs",
            "30",
        ])
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.telegram_token.as_deref(), Some("123:abc"));
        assert_eq!(config.busy_timeout_secs, 30);
    }

    #[test]
    fn test_missing_rules_file() {
        let config =
            Config::try_parse_from(["procurement", "--rules", "/nonexistent/rules.json"]).unwrap();
        assert!(matches!(config.load_rules(), Err(RulesError::Io(_))));
    }
}
