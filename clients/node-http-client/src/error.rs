//! Error taxonomy for storage node requests.

use serde_json::Value;

/// An HTTP error response from a storage node, kept with whatever body the
/// node returned so callers can inspect structured details.
#[derive(Debug)]
pub struct ApiError {
    pub status: u16,
    /// Parsed JSON body, when the node returned one.
    pub body: Option<Value>,
    /// Raw body text, kept when it was not valid JSON.
    pub raw: Option<String>,
}

impl ApiError {
    /// Human-readable message: prefer the node's structured
    /// `error.message`, fall back to the raw body, then to the body JSON,
    /// then to the bare status code.
    #[must_use]
    pub fn message(&self) -> String {
        let inferred = self
            .body
            .as_ref()
            .and_then(|body| body.get("error")?.get("message")?.as_str())
            .map(str::to_owned)
            .or_else(|| self.raw.clone())
            .or_else(|| self.body.as_ref().map(ToString::to_string));

        match inferred {
            Some(message) if !message.is_empty() => format!("{} {message}", self.status),
            _ => format!("{} status code (no body)", self.status),
        }
    }

    /// The machine-readable reason of the first structured error detail.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.body
            .as_ref()?
            .get("error")?
            .get("details")?
            .get(0)?
            .get("reason")?
            .as_str()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("request was aborted")]
    Aborted,
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(#[source] reqwest::Error),
    #[error("invalid storage node url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to decode storage node response: {0}")]
    Decode(String),
    #[error("{}", .0.message())]
    BadRequest(ApiError),
    /// The node has not yet observed the blob's on-chain registration.
    #[error("{}", .0.message())]
    NotRegistered(ApiError),
    #[error("{}", .0.message())]
    Authentication(ApiError),
    #[error("{}", .0.message())]
    PermissionDenied(ApiError),
    #[error("{}", .0.message())]
    NotFound(ApiError),
    #[error("{}", .0.message())]
    Conflict(ApiError),
    #[error("{}", .0.message())]
    UnprocessableEntity(ApiError),
    #[error("{}", .0.message())]
    RateLimited(ApiError),
    #[error("{}", .0.message())]
    LegallyUnavailable(ApiError),
    #[error("{}", .0.message())]
    Internal(ApiError),
    #[error("{}", .0.message())]
    Unexpected(ApiError),
}

impl NodeError {
    /// Classify a non-success HTTP response.
    #[must_use]
    pub fn from_response(status: u16, text: String) -> Self {
        let body: Option<Value> = serde_json::from_str(&text).ok();
        let raw = if body.is_some() { None } else { Some(text) };
        let api = ApiError { status, body, raw };

        match status {
            400 if api.reason() == Some("NOT_REGISTERED") => Self::NotRegistered(api),
            400 => Self::BadRequest(api),
            401 => Self::Authentication(api),
            403 => Self::PermissionDenied(api),
            404 => Self::NotFound(api),
            409 => Self::Conflict(api),
            422 => Self::UnprocessableEntity(api),
            429 => Self::RateLimited(api),
            451 => Self::LegallyUnavailable(api),
            500.. => Self::Internal(api),
            _ => Self::Unexpected(api),
        }
    }

    #[must_use]
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Self::BadRequest(api)
            | Self::NotRegistered(api)
            | Self::Authentication(api)
            | Self::PermissionDenied(api)
            | Self::NotFound(api)
            | Self::Conflict(api)
            | Self::UnprocessableEntity(api)
            | Self::RateLimited(api)
            | Self::LegallyUnavailable(api)
            | Self::Internal(api)
            | Self::Unexpected(api) => Some(api),
            _ => None,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.api().map(|api| api.status)
    }

    /// Whether retrying the same request against the same node can succeed:
    /// transient transport failures, rate limiting and server errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection(_) | Self::RateLimited(_) | Self::Internal(_)
        )
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the node refuses to serve the blob for legal reasons.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::LegallyUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_prefers_structured_error() {
        let error = NodeError::from_response(
            400,
            r#"{"error": {"message": "sliver index out of range"}}"#.to_owned(),
        );
        assert_eq!(error.to_string(), "400 sliver index out of range");
        assert!(matches!(error, NodeError::BadRequest(_)));
    }

    #[test]
    fn message_falls_back_to_raw_body_then_status() {
        let error = NodeError::from_response(500, "database on fire".to_owned());
        assert_eq!(error.to_string(), "500 database on fire");
        assert!(matches!(error, NodeError::Internal(_)));

        let error = NodeError::from_response(404, String::new());
        assert_eq!(error.to_string(), "404 status code (no body)");
        assert!(error.is_not_found());

        let error = NodeError::from_response(403, r#"{"code": 7}"#.to_owned());
        assert_eq!(error.to_string(), "403 {\"code\":7}");
    }

    #[test]
    fn not_registered_is_detected_from_details() {
        let error = NodeError::from_response(
            400,
            r#"{"error": {"message": "blob unknown", "details": [{"reason": "NOT_REGISTERED"}]}}"#
                .to_owned(),
        );
        assert!(matches!(error, NodeError::NotRegistered(_)));
        assert!(!error.is_retryable());

        let error = NodeError::from_response(
            400,
            r#"{"error": {"message": "bad request", "details": [{"reason": "OTHER"}]}}"#.to_owned(),
        );
        assert!(matches!(error, NodeError::BadRequest(_)));
    }

    #[test]
    fn status_classification() {
        assert!(matches!(
            NodeError::from_response(401, String::new()),
            NodeError::Authentication(_)
        ));
        assert!(matches!(
            NodeError::from_response(409, String::new()),
            NodeError::Conflict(_)
        ));
        assert!(matches!(
            NodeError::from_response(422, String::new()),
            NodeError::UnprocessableEntity(_)
        ));
        assert!(NodeError::from_response(451, String::new()).is_blocked());
        assert!(matches!(
            NodeError::from_response(418, String::new()),
            NodeError::Unexpected(_)
        ));
        assert_eq!(NodeError::from_response(503, String::new()).status(), Some(503));
    }

    #[test]
    fn retryable_statuses() {
        assert!(NodeError::from_response(429, String::new()).is_retryable());
        assert!(NodeError::from_response(503, String::new()).is_retryable());
        assert!(!NodeError::from_response(404, String::new()).is_retryable());
        assert!(NodeError::Timeout.is_retryable());
        assert!(!NodeError::Aborted.is_retryable());
    }
}
