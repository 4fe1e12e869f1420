//! Configuration types.
//!
//! Everything is read from the environment (after `dotenvy` has loaded any
//! `.env` file). Service endpoints are required; tuning knobs have defaults.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::gateways::APOLOGY;
use crate::llm::LlmConfig;

/// Telegram transport configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token. When absent the CLI channel is used instead.
    pub bot_token: Option<SecretString>,
    /// Usernames or numeric ids allowed to talk to the bot. `*` allows all.
    pub allowed_users: Vec<String>,
}

/// Durable queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Named channel inside the `queue_items` table.
    pub name: String,
    /// Number of independent consumer tasks.
    pub consumer_slots: usize,
    /// Deliveries before an item is dead-lettered.
    pub max_attempts: u32,
    /// How long a claimed item stays leased to one consumer.
    pub lease: Duration,
    /// Sleep between claims when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "astrology_requests".to_string(),
            consumer_slots: 1,
            max_attempts: 3,
            lease: Duration::from_secs(300), // 5 minutes
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Upstream HTTP service endpoint.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub timeout: Duration,
}

/// Reply generation configuration.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Hard ceiling on reply length, in characters.
    pub max_reply_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_reply_chars: 400,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Fallback filter directive when `RUST_LOG` is unset.
    pub level: Option<String>,
    /// Directory for daily-rotated log files.
    pub dir: Option<PathBuf>,
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub database_path: PathBuf,
    pub llm: LlmConfig,
    pub memory: ServiceConfig,
    pub prediction: ServiceConfig,
    pub queue: QueueConfig,
    pub generation: GenerationConfig,
    /// Turns kept per user in the recent-window cache.
    pub history_window: usize,
    /// Interval between typing indicators; must stay under Telegram's 5s expiry.
    pub presence_cadence: Duration,
    pub http_port: u16,
    pub log: LogConfig,
}

impl AppConfig {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let allowed_users = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let queue_defaults = QueueConfig::default();
        let queue = QueueConfig {
            name: get("ASTRO_QUEUE_NAME").unwrap_or(queue_defaults.name),
            consumer_slots: parse_or(&get, "ASTRO_CONSUMER_SLOTS", queue_defaults.consumer_slots)?,
            max_attempts: parse_or(&get, "ASTRO_QUEUE_MAX_ATTEMPTS", queue_defaults.max_attempts)?,
            lease: Duration::from_secs(parse_or(&get, "ASTRO_QUEUE_LEASE_SECS", 300)?),
            poll_interval: Duration::from_millis(parse_or(&get, "ASTRO_QUEUE_POLL_MS", 500)?),
        };
        if queue.consumer_slots == 0 {
            return Err(invalid("ASTRO_CONSUMER_SLOTS", "must be at least 1"));
        }
        if queue.max_attempts == 0 {
            return Err(invalid("ASTRO_QUEUE_MAX_ATTEMPTS", "must be at least 1"));
        }

        let llm_timeout = Duration::from_secs(parse_or(&get, "ASTRO_LLM_TIMEOUT_SECS", 120)?);
        if llm_timeout.is_zero() || llm_timeout >= queue.lease {
            return Err(invalid(
                "ASTRO_LLM_TIMEOUT_SECS",
                "must be at least 1 second and shorter than ASTRO_QUEUE_LEASE_SECS",
            ));
        }

        // The apology is the longest reply that bypasses generation.
        let max_reply_chars: usize = parse_or(&get, "ASTRO_REPLY_MAX_CHARS", 400)?;
        let apology_chars = APOLOGY.chars().count();
        if max_reply_chars < apology_chars {
            return Err(invalid(
                "ASTRO_REPLY_MAX_CHARS",
                &format!("must be at least {apology_chars}"),
            ));
        }

        let presence_secs: u64 = parse_or(&get, "ASTRO_PRESENCE_CADENCE_SECS", 4)?;
        if presence_secs == 0 || presence_secs >= 5 {
            return Err(invalid(
                "ASTRO_PRESENCE_CADENCE_SECS",
                "must be between 1 and 4 seconds",
            ));
        }

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: get("TELEGRAM_BOT_TOKEN").map(SecretString::from),
                allowed_users,
            },
            database_path: get("ASTRO_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data/astro-assist.db")),
            llm: LlmConfig {
                base_url: required("OLLAMA_HOST")?,
                model: required("OLLAMA_MODEL")?,
                enable_thinking: parse_or(&get, "ENABLE_THINKING", false)?,
                timeout: llm_timeout,
            },
            memory: ServiceConfig {
                base_url: required("MEM0_SERVICE_URL")?,
                timeout: Duration::from_secs(parse_or(&get, "ASTRO_MEMORY_TIMEOUT_SECS", 10)?),
            },
            prediction: ServiceConfig {
                base_url: required("ASTROLOGY_API_URL")?,
                timeout: Duration::from_secs(parse_or(
                    &get,
                    "ASTRO_PREDICTION_TIMEOUT_SECS",
                    30,
                )?),
            },
            queue,
            generation: GenerationConfig {
                max_reply_chars,
            },
            history_window: parse_or(&get, "ASTRO_HISTORY_WINDOW", 10)?,
            presence_cadence: Duration::from_secs(presence_secs),
            http_port: parse_or(&get, "ASTRO_HTTP_PORT", 8282)?,
            log: LogConfig {
                level: get("LOG_LEVEL").map(|l| l.to_lowercase()),
                dir: get("ASTRO_LOG_DIR").map(PathBuf::from),
            },
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| invalid(key, &e.to_string())),
        None => Ok(default),
    }
}

fn invalid(key: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}
