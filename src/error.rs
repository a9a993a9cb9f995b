//! Error handling for the AMPL ladder manager
//!
//! `LadderError` is the internal error type. Public reconciler operations never
//! return it directly; they fold it into the `OperationError` entries of their
//! reports so every caller sees one result shape.

use crate::clients::exchange::ExchangeError;
use crate::config::ConfigError;

/// Main error type for the ladder manager
#[derive(Debug, thiserror::Error)]
pub enum LadderError {
    // Configuration errors
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),

    // Exchange errors
    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    // Ladder logic errors
    #[error("Invalid ladder level {level} (ladder has {len} levels)")]
    InvalidLevel { level: usize, len: usize },

    // IO errors
    #[error("File read error: {0}")]
    FileRead(String),

    #[error("File write error: {0}")]
    FileWrite(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl LadderError {
    /// Get a user-friendly error message with helpful context
    pub fn user_message(&self) -> String {
        match self {
            LadderError::ConfigNotFound(path) => {
                format!(
                    "Configuration file not found: {}\n\n\
                    💡 Quick fix:\n\
                    1. Run: ampl-ladder init\n\
                    2. Edit ladder.toml (or export KUCOIN_API_* variables)\n\
                    3. Try again",
                    path
                )
            }
            LadderError::ConfigValidation(msg) => {
                format!(
                    "Configuration validation error: {}\n\n\
                    💡 Check ladder.toml for:\n\
                    - Buy levels in strictly descending order\n\
                    - Positive order size and markup above 1.0\n\
                    - Thresholds within the number of levels",
                    msg
                )
            }
            LadderError::Exchange(ExchangeError::Credentials(msg)) => {
                format!(
                    "Exchange authentication failed: {}\n\n\
                    💡 Check:\n\
                    - KUCOIN_API_KEY / KUCOIN_API_SECRET / KUCOIN_API_PASSPHRASE\n\
                    - Keys have trading permissions\n\
                    - rest_url points at the right environment",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            LadderError::Exchange(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error category for logging and structured reports
    pub fn category(&self) -> &'static str {
        match self {
            LadderError::ConfigNotFound(_)
            | LadderError::ConfigParse(_)
            | LadderError::ConfigValidation(_)
            | LadderError::ConfigMissing(_) => "config",

            LadderError::Exchange(_) => "exchange",

            LadderError::InvalidLevel { .. } => "ladder",

            LadderError::FileRead(_) | LadderError::FileWrite(_) => "io",

            LadderError::Internal(_) => "internal",
        }
    }
}

impl From<ConfigError> for LadderError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::FileRead(msg) => LadderError::FileRead(msg),
            ConfigError::FileWrite(msg) => LadderError::FileWrite(msg),
            ConfigError::Parse(msg) => LadderError::ConfigParse(msg),
            ConfigError::Serialize(msg) => LadderError::Internal(msg),
            ConfigError::Validation(msg) => LadderError::ConfigValidation(msg),
            ConfigError::MissingCredential(name) => LadderError::ConfigMissing(name),
        }
    }
}

impl From<serde_json::Error> for LadderError {
    fn from(err: serde_json::Error) -> Self {
        LadderError::Internal(format!("JSON error: {}", err))
    }
}

/// Result type alias using LadderError
pub type LadderResult<T> = Result<T, LadderError>;
