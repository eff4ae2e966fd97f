use thiserror::Error;

/// Top-level error type for the `ovsync-api` crate.
///
/// Covers every failure mode of the OVSDB wire client: socket
/// establishment, framing, JSON-RPC level errors, and value decoding.
/// `ovsync-core` maps these into caller-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// Socket-level I/O failure (read, write, or framing).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not establish the connection to the database server.
    #[error("Cannot connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// The connection closed while a request was outstanding, or a
    /// request was issued after the connection was lost.
    #[error("Connection to the database server was lost")]
    Disconnected,

    /// No reply arrived within the configured request timeout.
    #[error("Request `{method}` timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The endpoint string could not be interpreted.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The transport kind is not available on this platform.
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(&'static str),

    // ── JSON-RPC ────────────────────────────────────────────────────
    /// Malformed JSON on the wire, or a payload that did not match
    /// the expected shape.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered a request with a non-null `error` member.
    #[error("RPC `{method}` failed: {message}")]
    Rpc { method: String, message: String },

    /// A reply arrived whose shape the client does not understand.
    #[error("Unexpected response to `{method}`: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    // ── Data ────────────────────────────────────────────────────────
    /// An OVSDB value did not have the expected form.
    #[error(transparent)]
    Value(#[from] ValueError),
}

impl Error {
    /// Returns `true` if the connection is gone and no further
    /// requests on this client can succeed.
    pub fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Io(_))
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connect { .. })
    }
}

/// An OVSDB value (atom, set, or map) did not have the expected form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, found {found}")]
pub struct ValueError {
    pub expected: &'static str,
    pub found: String,
}

impl ValueError {
    pub(crate) fn new(expected: &'static str, found: &serde_json::Value) -> Self {
        let raw = found.to_string();
        let found = if raw.chars().count() > 64 {
            let mut short: String = raw.chars().take(64).collect();
            short.push_str("...");
            short
        } else {
            raw
        };
        Self { expected, found }
    }
}
