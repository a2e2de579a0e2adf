use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A convenience `Result` alias using [`ToolDockError`].
pub type ToolDockResult<T> = Result<T, ToolDockError>;

/// The closed set of failure classes that travel on the wire.
///
/// Serialized with the exact spelling clients match on
/// (`"NotFoundError"`, `"ValidationError"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// The requested tool, resource or prompt is not registered.
    #[serde(rename = "NotFoundError")]
    NotFound,
    /// Malformed frame, or arguments that do not satisfy the declared schema.
    #[serde(rename = "ValidationError")]
    Validation,
    /// A failure the handler signalled on purpose. The message is safe to show.
    #[serde(rename = "ToolError")]
    Tool,
    /// Anything the handler did not anticipate. The message is always generic.
    #[serde(rename = "InternalError")]
    Internal,
    /// The channel between client and server failed.
    #[serde(rename = "TransportError")]
    Transport,
    /// No response arrived before the deadline.
    #[serde(rename = "TimeoutError")]
    Timeout,
}

impl ErrorKind {
    /// The wire spelling of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Tool => "ToolError",
            ErrorKind::Internal => "InternalError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::Timeout => "TimeoutError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The generic message sent for [`ErrorKind::Internal`]. Raw handler error
/// text never leaves the process.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal error occurred";

/// Error body of an error [`Response`](crate::Response).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Failure class.
    pub kind: ErrorKind,
    /// Human readable description.
    pub message: String,
}

impl ErrorPayload {
    /// A payload of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// A `NotFoundError` payload.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// A `ValidationError` payload.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// A `ToolError` payload.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Tool, message)
    }

    /// An internal error carrying only the generic marker message.
    pub fn internal() -> Self {
        Self::new(ErrorKind::Internal, INTERNAL_ERROR_MESSAGE)
    }
}

impl fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Top-level error type for the tooldock crates.
///
/// Registry and transport failures are raised as dedicated variants so a
/// caller can tell a channel failure apart from an application error that
/// the remote side reported.
#[derive(Debug, Error)]
pub enum ToolDockError {
    /// A descriptor with this name or URI pattern is already registered.
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// No descriptor matches the requested name or URI.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A frame or argument set failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The channel to the remote side failed (spawn, write, EOF, refused).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The remote side did not answer before the deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote side answered with an error response.
    #[error("Remote error: {0}")]
    Remote(ErrorPayload),

    /// Establishing a session with a server failed during discovery.
    #[error("Setup failed for server '{server}': {source}")]
    Setup {
        /// The server that could not be set up.
        server: String,
        /// What went wrong.
        #[source]
        source: Box<ToolDockError>,
    },

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolDockError {
    /// The wire-level kind this error maps to.
    ///
    /// Errors that have no wire meaning (configuration, local I/O) map to
    /// [`ErrorKind::Internal`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            ToolDockError::NotFound(_) => ErrorKind::NotFound,
            ToolDockError::Validation(_) => ErrorKind::Validation,
            ToolDockError::Transport(_) => ErrorKind::Transport,
            ToolDockError::Timeout(_) => ErrorKind::Timeout,
            ToolDockError::Remote(payload) => payload.kind,
            ToolDockError::Setup { source, .. } => source.kind(),
            ToolDockError::DuplicateName(_)
            | ToolDockError::Config(_)
            | ToolDockError::Json(_)
            | ToolDockError::Io(_) => ErrorKind::Internal,
        }
    }

    /// True for channel-level failures (transport or timeout).
    pub fn is_channel_failure(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transport | ErrorKind::Timeout)
    }

    /// Kind plus bare message, the form shown to an LLM as a failed tool result.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            ToolDockError::Remote(payload) => payload.clone(),
            ToolDockError::Setup { source, .. } => source.to_payload(),
            ToolDockError::NotFound(m)
            | ToolDockError::Validation(m)
            | ToolDockError::Transport(m)
            | ToolDockError::Timeout(m) => ErrorPayload::new(self.kind(), m.clone()),
            other => ErrorPayload::new(ErrorKind::Internal, other.to_string()),
        }
    }
}
