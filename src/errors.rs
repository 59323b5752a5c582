use std::fmt;

use thiserror::Error;

/// Boxed error returned by custom response parsers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Structured validation error returned by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub field: Option<String>,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(field) = &self.field {
            write!(f, "{}: {}", field, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ValidationError {}

/// Convenience alias for fallible client results.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Transport-level error (timeouts, connectivity, cancellation).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    #[source]
    pub source: Option<reqwest::Error>,
}

impl TransportError {
    pub(crate) fn cancelled() -> Self {
        Self {
            kind: TransportErrorKind::Cancelled,
            message: "context cancelled".to_string(),
            source: None,
        }
    }

    pub(crate) fn deadline_exceeded() -> Self {
        Self {
            kind: TransportErrorKind::Timeout,
            message: "context deadline exceeded".to_string(),
            source: None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            TransportErrorKind::Timeout
        } else if err.is_connect() {
            TransportErrorKind::Connect
        } else if err.is_request() {
            TransportErrorKind::Request
        } else {
            TransportErrorKind::Other
        };

        Self {
            kind,
            message: err.to_string(),
            source: Some(err),
        }
    }
}

/// Broad transport error kinds for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Timeout,
    Connect,
    Request,
    Cancelled,
    Other,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Connect => "connect",
            TransportErrorKind::Request => "request",
            TransportErrorKind::Cancelled => "cancelled",
            TransportErrorKind::Other => "transport",
        };
        write!(f, "{label}")
    }
}

/// Failure to turn a response body into the caller's response type.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("custom parser: {0}")]
    Custom(#[source] BoxError),
}

/// Unified error type surfaced by the client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("client is not connected; call connect first")]
    NotConnected,

    #[error("OpenTSDB is unreachable: {source}")]
    Connection {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create request for {method} {url}: {message}")]
    RequestCreation {
        method: String,
        url: String,
        message: String,
    },

    #[error("failed to send request for {method} {url}: {source}")]
    Transport {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to read response body for {method} {url}: {source}")]
    Read {
        method: String,
        url: String,
        #[source]
        source: TransportError,
    },

    #[error("failed to parse response body for {method} {url}: {source}")]
    Parse {
        method: String,
        url: String,
        #[source]
        source: ParseError,
    },
}

/// Coarse classification of [`Error`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Config,
    NotConnected,
    Connection,
    RequestCreation,
    Transport,
    Read,
    Parse,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::Config(_) => ErrorKind::Config,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::Connection { .. } => ErrorKind::Connection,
            Error::RequestCreation { .. } => ErrorKind::RequestCreation,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Read { .. } => ErrorKind::Read,
            Error::Parse { .. } => ErrorKind::Parse,
        }
    }

    /// Transport classification for send and read failures.
    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Error::Transport { source, .. } | Error::Read { source, .. } => Some(source.kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_formats_with_field() {
        let err = ValidationError::new("unsupported operate method GET").with_field("method");
        assert_eq!(err.to_string(), "method: unsupported operate method GET");
    }

    #[test]
    fn connection_error_names_the_cause() {
        let err = Error::Connection {
            host: "localhost:4242".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "OpenTSDB is unreachable: refused");
        assert_eq!(err.kind(), ErrorKind::Connection);
    }

    #[test]
    fn dispatch_errors_carry_method_and_url() {
        let err = Error::Transport {
            method: "POST".into(),
            url: "http://localhost:4242/api/put".into(),
            source: TransportError::cancelled(),
        };
        assert_eq!(
            err.to_string(),
            "failed to send request for POST http://localhost:4242/api/put: cancelled: context cancelled"
        );
        assert_eq!(err.transport_kind(), Some(TransportErrorKind::Cancelled));
    }

    #[test]
    fn custom_parse_errors_keep_their_message() {
        let err = Error::Parse {
            method: "GET".into(),
            url: "/api/aggregators".into(),
            source: ParseError::Custom("expected array".into()),
        };
        assert!(err.to_string().ends_with("custom parser: expected array"));
        assert_eq!(err.kind(), ErrorKind::Parse);
        assert_eq!(err.transport_kind(), None);
    }
}
