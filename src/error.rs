//! Error types
//!
//! Everything that can go wrong synchronously at the session boundary is an
//! [`Error`]. Provider and tool failures are asynchronous and never cross the
//! boundary as return values; they are reported through the session handler.

use std::time::Duration;
use thiserror::Error;

use crate::session::SessionState;

/// Errors returned by fallible session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A configuration string was empty or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not valid in the session's current state.
    #[error("invalid state: session is {state}")]
    InvalidState { state: SessionState },

    /// The caller broke a documented usage contract.
    #[error("contract violation: {0}")]
    ContractViolation(&'static str),

    /// No async runtime could be started for the session.
    #[error("runtime unavailable: {0}")]
    Runtime(String),

    /// The provider's HTTP client could not be constructed.
    #[error("HTTP client unavailable: {0}")]
    HttpClient(String),
}

impl Error {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Error::InvalidArgument(message.into())
    }

    /// Map to the two-valued code used at the C boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::InvalidArgument(_)
            | Error::InvalidState { .. }
            | Error::ContractViolation(_)
            | Error::Runtime(_)
            | Error::HttpClient(_) => ErrorCode::Invalid,
        }
    }
}

/// Result codes returned by the C boundary.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No error occurred.
    Ok = 0,
    /// Invalid argument or invalid state.
    Invalid = 1,
}

impl<T> From<&Result<T, Error>> for ErrorCode {
    fn from(result: &Result<T, Error>) -> Self {
        match result {
            Ok(_) => ErrorCode::Ok,
            Err(e) => e.code(),
        }
    }
}

// ============================================================================
// Provider errors
// ============================================================================

/// Provider error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_retry_after(mut self, duration: Duration) -> Self {
        self.retry_after = Some(duration);
        self
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Network, message)
    }

    pub fn rate_limit(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RateLimit, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::ServerError, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidRequest, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Unknown, message)
    }
}

/// Error classification for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Network issues, timeouts - retryable
    Network,
    /// Rate limited (429) - retryable with backoff
    RateLimit,
    /// Server error (5xx) - retryable
    ServerError,
    /// Authentication failed (401, 403) - not retryable
    Auth,
    /// Bad request (400) - not retryable
    InvalidRequest,
    /// Unknown error
    Unknown,
}

impl ProviderErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Network | Self::RateLimit | Self::ServerError)
    }
}

// ============================================================================
// Session failures
// ============================================================================

/// Why an agent loop gave up on a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The provider failed and retries (if any) were exhausted.
    Provider(ProviderErrorKind),
    /// The turn needed more provider exchanges than allowed.
    TurnLimit,
}

/// An asynchronous agent loop failure, delivered through the session handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct SessionFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl SessionFailure {
    pub fn provider(error: &ProviderError, attempts: u32) -> Self {
        let message = if error.kind.is_retryable() && attempts > 1 {
            format!("Failed after {attempts} attempts: {}", error.message)
        } else {
            error.message.clone()
        };
        Self {
            kind: FailureKind::Provider(error.kind),
            message,
        }
    }

    pub fn turn_limit(max_turns: u32) -> Self {
        Self {
            kind: FailureKind::TurnLimit,
            message: format!("Stopped after {max_turns} provider exchanges without finishing"),
        }
    }

    /// Text of the assistant-source transcript notice for this failure.
    pub fn notice(&self) -> String {
        format!("Error: {}", self.message)
    }
}

// ============================================================================
// Tool errors
// ============================================================================

/// The kind of tool failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolErrorKind {
    /// The arguments supplied by the provider could not be used.
    InvalidInput,
    /// The tool ran and failed.
    Execution,
    /// No tool with the requested name is registered.
    NotFound,
}

/// A tool call failure. Fed back to the provider as an error result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {reason}")]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub reason: String,
}

impl ToolError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::InvalidInput,
            reason: reason.into(),
        }
    }

    pub fn execution(reason: impl Into<String>) -> Self {
        Self {
            kind: ToolErrorKind::Execution,
            reason: reason.into(),
        }
    }

    pub fn not_found(name: &str) -> Self {
        Self {
            kind: ToolErrorKind::NotFound,
            reason: format!("unknown tool: {name}"),
        }
    }
}
