use thiserror::Error;

use crate::models::RunCounters;

/// Type alias for Result with ExportError
pub type Result<T> = std::result::Result<T, ExportError>;

/// Error types for the Gmail export pipeline
#[derive(Error, Debug)]
pub enum ExportError {
    /// Gmail API returned an error
    #[error("Gmail API error: {0}")]
    ApiError(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    /// Network-related error (connection issues, timeouts, etc.)
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server returned 5xx error
    #[error("Server error (HTTP {status}): {message}")]
    ServerError { status: u16, message: String },

    /// Resource not found (404)
    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// Bad request (400)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden (403)
    #[error("Access forbidden: {0}")]
    Forbidden(String),

    /// Provider data could not be interpreted
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// The metadata view of a message was not returned
    #[error("Message metadata unavailable: {0}")]
    MissingMetadata(String),

    /// The raw view of a message was not returned
    #[error("Raw message content unavailable: {0}")]
    MissingRawContent(String),

    /// Attachment lookup returned no object
    #[error("Attachment is null")]
    AttachmentMissing,

    /// Attachment object carried no payload
    #[error("Attachment data is null")]
    AttachmentDataMissing,

    /// A filter pattern failed to compile
    #[error("Invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// IO error (file operations, etc.)
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Paged listing failed part-way through a run.
    ///
    /// `counters` holds the tallies of the pages that were fully processed
    /// before the failure.
    #[error("Message listing failed after {} messages: {source}", .counters.total())]
    ListingAborted {
        counters: RunCounters,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    /// Errors produced while fetching or saving a single attachment
    pub fn is_attachment_error(&self) -> bool {
        matches!(
            self,
            ExportError::AttachmentMissing | ExportError::AttachmentDataMissing
        )
    }

    /// True for the provider's "no such resource" answer
    pub fn is_not_found(&self) -> bool {
        matches!(self, ExportError::MessageNotFound(_))
    }
}

/// Parse the Retry-After header from an HTTP response
///
/// The Retry-After header can be specified in two formats:
/// 1. Delay-seconds: An integer indicating seconds to wait (e.g., "120")
/// 2. HTTP-date: An HTTP date format (e.g., "Wed, 21 Oct 2015 07:28:00 GMT")
///
/// Falls back to 5 seconds when the header is missing or unusable.
fn parse_retry_after_header<B>(response: &hyper::Response<B>) -> u64 {
    const DEFAULT_RETRY_AFTER: u64 = 5;

    let Some(value) = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
    else {
        return DEFAULT_RETRY_AFTER;
    };

    if let Ok(seconds) = value.parse::<u64>() {
        return seconds;
    }

    httpdate::parse_http_date(value)
        .ok()
        .and_then(|date| date.duration_since(std::time::SystemTime::now()).ok())
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_RETRY_AFTER)
}

impl From<google_gmail1::Error> for ExportError {
    fn from(error: google_gmail1::Error) -> Self {
        match error {
            google_gmail1::Error::Failure(ref response) => {
                let status = response.status();
                let status_code = status.as_u16();
                let message = format!(
                    "HTTP {}: {}",
                    status_code,
                    status.canonical_reason().unwrap_or("Unknown")
                );

                match status_code {
                    429 => ExportError::RateLimitExceeded {
                        retry_after: parse_retry_after_header(response),
                    },
                    404 => ExportError::MessageNotFound("Resource not found".to_string()),
                    400 => ExportError::BadRequest(message),
                    401 => ExportError::AuthError(message),
                    403 => ExportError::Forbidden(message),
                    500..=599 => ExportError::ServerError {
                        status: status_code,
                        message,
                    },
                    _ => ExportError::ApiError(message),
                }
            }
            google_gmail1::Error::BadRequest(ref err) => ExportError::BadRequest(format!("{}", err)),
            google_gmail1::Error::HttpError(ref err) => {
                ExportError::NetworkError(format!("Connection error: {}", err))
            }
            google_gmail1::Error::Io(err) => ExportError::NetworkError(err.to_string()),
            _ => ExportError::ApiError(error.to_string()),
        }
    }
}
