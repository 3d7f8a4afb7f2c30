use thiserror::Error;

/// Validation and contract errors exposed by `tickerlens-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("symbol cannot be empty")]
    EmptySymbol,
    #[error("symbol length {len} exceeds max {max}")]
    SymbolTooLong { len: usize, max: usize },
    #[error("symbol must start with an ASCII letter: '{ch}'")]
    SymbolInvalidStart { ch: char },
    #[error("symbol contains invalid character '{ch}' at index {index}")]
    SymbolInvalidChar { ch: char, index: usize },

    #[error("date must be YYYY-MM-DD: '{value}'")]
    InvalidDate { value: String },

    #[error("series must have equal length ({len_a} vs {len_b})")]
    SeriesLengthMismatch { len_a: usize, len_b: usize },
    #[error("need at least {min} data points for correlation, got {got}")]
    TooFewDataPoints { min: usize, got: usize },

    #[error("field '{field}' must be finite")]
    NonFiniteValue { field: &'static str },
    #[error("field '{field}' must be non-negative")]
    NegativeValue { field: &'static str },

    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },
    #[error("bad arguments for tool '{tool}': {message}")]
    BadArguments { tool: &'static str, message: String },
}

/// Failure classification for external collaborators (backend API,
/// embedding provider, vector store).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamErrorKind {
    /// The call exceeded its deadline.
    Timeout,
    /// Connection or protocol failure before a status was received.
    Transport,
    /// The upstream answered with a non-success status.
    Status,
    /// The upstream answered but the payload could not be decoded.
    Decode,
    /// The request was rejected before leaving the process.
    InvalidRequest,
}

/// Structured error for calls that leave the process.
///
/// Empty result sets are never expressed through this type; a clean search
/// with zero matches returns an empty collection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct UpstreamError {
    kind: UpstreamErrorKind,
    message: String,
    retryable: bool,
}

impl UpstreamError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Timeout,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Transport,
            message: message.into(),
            retryable: true,
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Status,
            message: format!("upstream returned status {status}: {}", message.into()),
            retryable: matches!(status, 408 | 429 | 500 | 502 | 503 | 504),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::Decode,
            message: message.into(),
            retryable: false,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: UpstreamErrorKind::InvalidRequest,
            message: message.into(),
            retryable: false,
        }
    }

    pub const fn kind(&self) -> UpstreamErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }
}
