use thiserror::Error;

/// Longest webhook failure detail shown to the operator.
const ALERT_DETAIL_CHARS: usize = 200;

/// Typed error hierarchy for leaddesk.
///
/// Use at module boundaries (store calls, webhook dispatch, config and form
/// validation). Internal/leaf functions can continue using `anyhow::Result`;
/// the `Internal` variant allows seamless conversion via the `?` operator.
#[derive(Debug, Error)]
pub enum LeaddeskError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {message}")]
    Store { message: String, retryable: bool },

    #[error("Webhook failed: {}", webhook_summary(.status, .detail))]
    Webhook { status: Option<u16>, detail: String },

    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Convenience alias for results using `LeaddeskError`.
pub type LeaddeskResult<T> = std::result::Result<T, LeaddeskError>;

impl LeaddeskError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether this error is transient and the operation could be retried by the user.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store { retryable, .. } => *retryable,
            Self::Webhook { status, .. } => status.is_none_or(|s| s >= 500),
            Self::Internal(_) => true,
            Self::Config(_) | Self::Validation { .. } => false,
        }
    }

    /// Text for the blocking alert shown when a user-initiated write fails.
    pub fn alert_message(&self) -> String {
        match self {
            Self::Webhook { status, detail } => {
                let detail = crate::utils::truncate_chars(detail, ALERT_DETAIL_CHARS);
                format!("Webhook failed: {}", webhook_summary(status, &detail))
            }
            other => other.to_string(),
        }
    }
}

#[allow(clippy::ref_option)]
fn webhook_summary(status: &Option<u16>, detail: &str) -> String {
    match (*status, detail.is_empty()) {
        (Some(code), true) => code.to_string(),
        (Some(code), false) => format!("{} - {}", code, detail),
        (None, true) => "unreachable".to_string(),
        (None, false) => format!("unreachable - {}", detail),
    }
}
