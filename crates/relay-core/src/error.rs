use thiserror::Error;

use crate::protocol::{ErrorCode, RunErrorInfo};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Input conversion error: {0}")]
    InputConversion(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    /// A handler failed for a reason other than payload decoding. The
    /// built-in handlers only fail on decode; this is for handlers added later.
    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Source stream error: {0}")]
    SourceStream(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Stable error code reported to clients in a `RunError` event.
    pub fn code(&self) -> ErrorCode {
        match self {
            RelayError::InputConversion(_) => ErrorCode::InputConversionError,
            RelayError::MalformedEvent(_) | RelayError::Json(_) => ErrorCode::MalformedEvent,
            RelayError::Handler(_) => ErrorCode::HandlerError,
            RelayError::SourceStream(_) | RelayError::Engine(_) => ErrorCode::SourceStreamError,
            RelayError::Config(_) | RelayError::Io(_) | RelayError::Other(_) => {
                ErrorCode::InternalError
            }
        }
    }

    /// Normalize into the `{message, code}` descriptor carried by `RunError`.
    pub fn to_run_error(&self) -> RunErrorInfo {
        RunErrorInfo {
            message: self.to_string(),
            code: self.code(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_by_taxonomy() {
        assert_eq!(
            RelayError::InputConversion("bad role".into()).code(),
            ErrorCode::InputConversionError
        );
        assert_eq!(
            RelayError::SourceStream("reset".into()).code(),
            ErrorCode::SourceStreamError
        );
        assert_eq!(
            RelayError::Handler("boom".into()).code(),
            ErrorCode::HandlerError
        );
    }

    #[test]
    fn test_json_error_is_malformed_event() {
        let err: RelayError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        let info = err.to_run_error();
        assert_eq!(info.code, ErrorCode::MalformedEvent);
        assert!(info.message.starts_with("JSON error"));
    }
}
