use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiggerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("{operation} timed out")]
    Timeout { operation: String },

    #[error("Not authenticated with {0}. Please re-authenticate.")]
    NotAuthenticated(String),

    #[error("Authentication with {destination} failed: {reason}")]
    AuthenticationFailed { destination: String, reason: String },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0} does not support explicit source lists")]
    Unsupported(String),

    #[error("Credential store error: {0}")]
    Credentials(String),

    #[error("No sources provided")]
    NoSources,

    #[error("No destination provided")]
    NoDestination,

    #[error("No tracks found from any source")]
    NoTracks,

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Batch stopped after {added} additions: {reason}")]
    PartialBatch { added: usize, reason: String },

    #[error("Cancelled")]
    Cancelled,
}

impl DiggerError {
    /// Transient failures worth another attempt: timeouts, connection errors,
    /// rate limiting and 5xx responses.
    pub fn is_retryable(&self) -> bool {
        match self {
            DiggerError::Http(e) => {
                if let Some(status) = e.status() {
                    status.is_server_error() || status.as_u16() == 429
                } else {
                    e.is_timeout() || e.is_connect() || e.is_request()
                }
            }
            DiggerError::Api { status, .. } => *status >= 500 || *status == 429,
            DiggerError::Timeout { .. } => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DiggerError>;
