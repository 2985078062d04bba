use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// A field has an invalid value and reason.
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    /// Filesystem read error.
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML parse error: {0}")]
    Toml(String),
}

/// LLM provider errors
#[derive(Debug, Error)]
pub enum LlmError {
    /// Remote API failure.
    #[error("{0}")]
    Api(String),

    /// Provider throttled the request.
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Provider response schema/content was invalid.
    #[error("Invalid response from LLM: {0}")]
    InvalidResponse(String),

    /// Serialization/deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Session memory storage errors
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Filesystem operation on a session artifact failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// A session could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while answering a query.
///
/// None of these escape `GatewayManager::ask`; they are folded into a failed
/// `QueryResult` at that boundary.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No backend has a usable credential.
    #[error("No providers available")]
    NoProviderAvailable,

    /// The backend call itself failed.
    #[error("{0}")]
    ProviderInvocation(#[from] LlmError),

    /// The model reply held no recoverable JSON object.
    #[error("Failed to parse structured JSON response: {reason}")]
    StructuredParse { reason: String, raw: String },

    /// Reading or persisting session memory failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Memory operations were requested from a stateless manager.
    #[error("Memory not supported by this manager")]
    MemoryUnsupported,
}

impl GatewayError {
    /// Returns the raw model text attached to a parse failure, if any.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::StructuredParse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// HTTP surface errors
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Listener could not be bound.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Server terminated with an error.
    #[error("Server error: {0}")]
    Server(String),
}
