use std::time::Duration;

use thiserror::Error;

/// Geolocation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// Ways a response body can fail to yield a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedResponse {
    #[error("Response shorter than the {expected}-character preamble (got {actual})")]
    MissingPreamble { expected: usize, actual: usize },
    #[error("Response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Response JSON is not an array")]
    NotAnArray,
    #[error("Response array is empty")]
    EmptyArray,
    #[error("First array element is not an object")]
    NotAnObject,
    #[error("First array element has no field '{0}'")]
    MissingField(String),
    #[error("Field '{field}' is not a {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Errors that abort a single flow invocation.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error(transparent)]
    Location(#[from] LocationError),
    #[error("Request failed: {0}")]
    Transport(String),
    #[error("Request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Malformed response: {0}")]
    Malformed(#[from] MalformedResponse),
    #[error("Sending to device failed: {0}")]
    Send(String),
}

impl RelayError {
    /// Name of the step that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            RelayError::Location(_) => "location",
            RelayError::Transport(_) | RelayError::Status { .. } => "fetch",
            RelayError::Malformed(_) => "parse",
            RelayError::Send(_) => "send",
        }
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_follow_flow_order() {
        assert_eq!(RelayError::from(LocationError::PermissionDenied).stage(), "location");
        assert_eq!(RelayError::Transport("refused".into()).stage(), "fetch");
        let status = RelayError::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(status.stage(), "fetch");
        assert_eq!(RelayError::from(MalformedResponse::EmptyArray).stage(), "parse");
        assert_eq!(RelayError::Send("nack".into()).stage(), "send");
    }

    #[test]
    fn location_error_message_is_preserved() {
        let err = RelayError::from(LocationError::Timeout(Duration::from_millis(15_000)));
        assert_eq!(err.to_string(), "Location request timed out after 15s");
    }
}
