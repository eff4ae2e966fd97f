// ── Core error types ──
//
// Caller-facing errors from ovsync-core. Consumers never see JSON-RPC
// framing or socket details directly; the `From<ovsync_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to database server at {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Not connected to a database server")]
    NotConnected,

    #[error("Already connected to {current}; refusing to reconnect to {requested}")]
    AlreadyConnected { current: String, requested: String },

    #[error("Database request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ── Transaction errors ───────────────────────────────────────────
    /// The server returned fewer replies than operations submitted. The
    /// whole transaction is treated as failed.
    #[error("{action} failed: expected at least {expected} replies, got {received}")]
    Protocol {
        action: String,
        expected: usize,
        received: usize,
    },

    /// One operation (or the commit itself, when `index` is `None`)
    /// reported an error.
    #[error("{action} transaction failed{}: {code}{}",
        .index.map(|i| format!(" at operation {i}")).unwrap_or_default(),
        .details.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    Transaction {
        action: String,
        index: Option<usize>,
        code: String,
        details: Option<String>,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("{entity_type} not found: {name}")]
    NotFound {
        entity_type: &'static str,
        name: String,
    },

    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    // ── Wrapped API errors ───────────────────────────────────────────
    #[error("Database error: {message}")]
    Api { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub(crate) fn not_found(entity_type: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            name: name.into(),
        }
    }

    /// `true` for the lookup-miss variant.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ovsync_api::Error> for CoreError {
    fn from(err: ovsync_api::Error) -> Self {
        match err {
            ovsync_api::Error::Connect { endpoint, reason } => {
                CoreError::ConnectionFailed { endpoint, reason }
            }
            ovsync_api::Error::Disconnected => CoreError::ConnectionFailed {
                endpoint: String::new(),
                reason: "connection lost".into(),
            },
            ovsync_api::Error::Io(e) => CoreError::ConnectionFailed {
                endpoint: String::new(),
                reason: e.to_string(),
            },
            ovsync_api::Error::Timeout { timeout_ms, .. } => CoreError::Timeout { timeout_ms },
            ovsync_api::Error::InvalidEndpoint(reason) => CoreError::Config {
                message: format!("invalid endpoint: {reason}"),
            },
            ovsync_api::Error::UnsupportedTransport(kind) => CoreError::Config {
                message: format!("transport '{kind}' is not supported on this platform"),
            },
            ovsync_api::Error::Rpc { method, message } => CoreError::Api {
                message: format!("{method}: {message}"),
            },
            ovsync_api::Error::UnexpectedResponse { method, detail } => CoreError::Api {
                message: format!("unexpected {method} response: {detail}"),
            },
            ovsync_api::Error::Json(e) => CoreError::Internal(format!("JSON error: {e}")),
            ovsync_api::Error::Value(e) => CoreError::Internal(format!("value error: {e}")),
        }
    }
}
