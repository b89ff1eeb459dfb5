use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Network or connection failure while talking to the MNI endpoint.
    TransportFailure(String),
    /// The caller-imposed timeout elapsed before the endpoint answered.
    Timeout(String),
    /// Multipart (MTOM) response that could not be split.
    ///
    /// The full raw response is retained for diagnostics.
    MalformedMultipart {
        /// What was wrong with the body.
        reason: String,
        /// The response body exactly as received.
        raw_response: Vec<u8>,
    },
    /// The envelope could not be parsed as SOAP XML.
    InvalidResponse(String),
    /// The endpoint answered with a SOAP `Fault`.
    ServiceFault(String),
    /// Content resolution produced no document bytes.
    EmptyDocumentContent,
    /// The server processed the request and reported a logical failure.
    SubmissionRejected(String),
    /// Credentials were refused. Raised by the caller layer only.
    AuthenticationRejected(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Whether a caller may retry the operation.
    ///
    /// Only transport-level failures qualify; everything else is a hard error.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::TransportFailure(_) | AppError::Timeout(_) => true,
            AppError::WithContext { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Strips any `WithContext` wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::TransportFailure(msg) => write!(f, "Transport failure: {}", msg),
            AppError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            AppError::MalformedMultipart {
                reason,
                raw_response,
            } => write!(
                f,
                "Malformed multipart response: {} ({} bytes)",
                reason,
                raw_response.len()
            ),
            AppError::InvalidResponse(msg) => write!(f, "Invalid SOAP response: {}", msg),
            AppError::ServiceFault(msg) => write!(f, "SOAP fault: {}", msg),
            AppError::EmptyDocumentContent => write!(f, "Document content is empty"),
            AppError::SubmissionRejected(msg) => write!(f, "Submission rejected: {}", msg),
            AppError::AuthenticationRejected(msg) => {
                write!(f, "Authentication rejected: {}", msg)
            }
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    /// Logs errors appropriately based on their severity.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::TransportFailure(msg) => {
                tracing::error!("Transport failure: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "MNI endpoint unreachable".to_string(),
                )
            }
            AppError::Timeout(msg) => {
                tracing::warn!("MNI call timed out: {}", msg);
                (
                    StatusCode::GATEWAY_TIMEOUT,
                    "MNI endpoint timed out".to_string(),
                )
            }
            AppError::MalformedMultipart {
                reason,
                raw_response,
            } => {
                tracing::error!(
                    "Malformed multipart response: {} - raw response: {}",
                    reason,
                    String::from_utf8_lossy(raw_response)
                );
                (
                    StatusCode::BAD_GATEWAY,
                    format!("Malformed multipart response: {}", reason),
                )
            }
            AppError::InvalidResponse(msg) => {
                tracing::error!("Invalid SOAP response: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::ServiceFault(msg) => {
                tracing::warn!("SOAP fault: {}", msg);
                (StatusCode::BAD_GATEWAY, msg.clone())
            }
            AppError::EmptyDocumentContent => (
                StatusCode::NOT_FOUND,
                "Document content is empty".to_string(),
            ),
            AppError::SubmissionRejected(msg) => {
                // Expected outcome, not a system fault
                tracing::info!("Submission rejected by MNI: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::AuthenticationRejected(msg) => {
                tracing::warn!("Authentication rejected: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::debug!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return (**source).clone().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    /// Converts a `reqwest::Error` into an `AppError`.
    ///
    /// Timeouts stay distinct from other transport failures.
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout(err.to_string())
        } else {
            AppError::TransportFailure(err.to_string())
        }
    }
}

impl From<xmltree::ParseError> for AppError {
    fn from(err: xmltree::ParseError) -> Self {
        AppError::InvalidResponse(format!("XML parse error: {}", err))
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    ///
    /// # Arguments
    ///
    /// * `f` - A closure that produces the context message.
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
