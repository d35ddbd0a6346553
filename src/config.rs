//! Configuration types, read from the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::relay::correlation::DEFAULT_CORRELATION_CAPACITY;
use crate::relay::identity::{AliasFormat, DEFAULT_ALIAS_DIGITS, DEFAULT_ALIAS_PREFIX};
use crate::relay::rate_limit::{DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW};
use crate::relay::types::UserId;

/// Routing policy. Exactly one is active per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RelayMode {
    /// Anonymous room: every message goes to every other member under an
    /// alias.
    #[default]
    Broadcast,
    /// Every message goes to the owner, who can reply to the sender.
    Directed,
}

impl FromStr for RelayMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "broadcast" | "room" | "anonymous" => Ok(Self::Broadcast),
            "directed" | "relay" | "inbox" => Ok(Self::Directed),
            other => Err(ConfigError::InvalidValue {
                key: "RELAY_MODE".into(),
                message: format!("expected broadcast or directed, got {other:?}"),
            }),
        }
    }
}

impl std::fmt::Display for RelayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Broadcast => "broadcast",
            Self::Directed => "directed",
        };
        write!(f, "{s}")
    }
}

/// Settings for the relay core.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub mode: RelayMode,
    /// The owner/administrator account.
    pub owner: UserId,
    pub alias_format: AliasFormat,
    /// Accepted messages per user per window.
    pub rate_limit: usize,
    pub rate_window: Duration,
    /// Maximum retained forward correlations.
    pub correlation_capacity: usize,
    /// Upper bound on every outbound platform call.
    pub delivery_timeout: Duration,
    /// Directory holding the snapshot files.
    pub data_dir: PathBuf,
}

impl RelayConfig {
    /// Defaults for everything except mode and owner.
    pub fn new(mode: RelayMode, owner: UserId) -> Self {
        Self {
            mode,
            owner,
            alias_format: AliasFormat::default(),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
            correlation_capacity: DEFAULT_CORRELATION_CAPACITY,
            delivery_timeout: Duration::from_secs(10),
            data_dir: PathBuf::from("./data"),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let owner: i64 = required("OWNER_ID")?;
        let mode = match std::env::var("RELAY_MODE") {
            Ok(raw) => raw.parse()?,
            Err(_) => RelayMode::default(),
        };

        let alias_format = AliasFormat {
            prefix: std::env::var("RELAY_ALIAS_PREFIX")
                .unwrap_or_else(|_| DEFAULT_ALIAS_PREFIX.to_string()),
            digits: optional("RELAY_ALIAS_DIGITS", DEFAULT_ALIAS_DIGITS)?,
        };
        if !(1..=18).contains(&alias_format.digits) {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_ALIAS_DIGITS".into(),
                message: "must be between 1 and 18".into(),
            });
        }

        let rate_limit = optional("RELAY_RATE_LIMIT", DEFAULT_RATE_LIMIT)?;
        if rate_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RELAY_RATE_LIMIT".into(),
                message: "must be at least 1".into(),
            });
        }

        Ok(Self {
            mode,
            owner: UserId(owner),
            alias_format,
            rate_limit,
            rate_window: Duration::from_secs(optional(
                "RELAY_RATE_WINDOW_SECS",
                DEFAULT_RATE_WINDOW.as_secs(),
            )?),
            correlation_capacity: optional(
                "RELAY_CORRELATION_CAPACITY",
                DEFAULT_CORRELATION_CAPACITY,
            )?,
            delivery_timeout: Duration::from_secs(optional("RELAY_DELIVERY_TIMEOUT_SECS", 10)?),
            data_dir: std::env::var("RELAY_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data")),
        })
    }
}

/// Process-level settings: platform credentials and peripheral services.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram_token: SecretString,
    /// Port for the liveness endpoint.
    pub port: u16,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
    pub relay: RelayConfig,
}

impl BotConfig {
    /// Build config from environment variables, loading `.env` first.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let telegram_token = std::env::var("TELEGRAM_TOKEN")
            .or_else(|_| std::env::var("TELEGRAM_BOT_TOKEN"))
            .map_err(|_| ConfigError::MissingEnvVar("TELEGRAM_TOKEN".into()))?;

        Ok(Self {
            telegram_token: SecretString::from(telegram_token),
            port: optional("PORT", 8080)?,
            log_dir: std::env::var("RELAY_LOG_DIR").ok().map(PathBuf::from),
            relay: RelayConfig::from_env()?,
        })
    }
}

fn required<T: FromStr>(key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))?;
    parse(key, &raw)
}

fn optional<T: FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => parse(key, &raw),
        _ => Ok(default),
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}
