//! Configuration types.

use std::str::FromStr;

use rust_decimal::Decimal;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::flow::PriceQuote;
use crate::llm::AgentConfig;

const MIB: u64 = 1024 * 1024;

/// Upload validation limits for document submissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadLimits {
    /// Accepted MIME types. Photos are always JPEG.
    pub allowed_mime_types: Vec<String>,
    /// Size ceiling in bytes.
    pub max_bytes: u64,
}

impl UploadLimits {
    pub fn with_max_mb(max_mb: u64) -> Self {
        Self {
            max_bytes: max_mb.saturating_mul(MIB),
            ..Self::default()
        }
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "application/pdf".to_string(),
            ],
            max_bytes: 10 * MIB,
        }
    }
}

/// Telegram transport settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Extraction service settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    pub base_url: String,
    pub api_key: SecretString,
}

/// Full bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub telegram: TelegramConfig,
    pub agent: AgentConfig,
    pub extraction: ExtractionConfig,
    pub quote: PriceQuote,
    pub limits: UploadLimits,
}

impl BotConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let telegram = TelegramConfig {
            bot_token: SecretString::from(required("TELEGRAM_BOT_TOKEN")?),
            allowed_users: optional("TELEGRAM_ALLOWED_USERS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        };

        let agent = AgentConfig {
            api_key: SecretString::from(required("ANTHROPIC_API_KEY")?),
            model: optional("INTAKE_MODEL", "claude-sonnet-4-20250514"),
            max_turns: parse_value("INTAKE_AGENT_MAX_TURNS", &optional("INTAKE_AGENT_MAX_TURNS", "4"))?,
            max_tokens: 1024,
        };

        let extraction = ExtractionConfig {
            base_url: required("EXTRACTION_API_URL")?
                .trim_end_matches('/')
                .to_string(),
            api_key: SecretString::from(required("EXTRACTION_API_KEY")?),
        };

        let amount: Decimal =
            parse_value("INTAKE_PRICE_AMOUNT", &optional("INTAKE_PRICE_AMOUNT", "100"))?;
        if amount <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue {
                key: "INTAKE_PRICE_AMOUNT".to_string(),
                message: "must be positive".to_string(),
            });
        }
        let quote = PriceQuote::new(amount, optional("INTAKE_PRICE_CURRENCY", "USD").to_uppercase());

        let max_mb: u64 = parse_value("INTAKE_MAX_FILE_MB", &optional("INTAKE_MAX_FILE_MB", "10"))?;

        Ok(Self {
            telegram,
            agent,
            extraction,
            quote,
            limits: UploadLimits::with_max_mb(max_mb),
        })
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
