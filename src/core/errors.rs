use thiserror::Error;

/// Code reported for failures that did not come from a response envelope
pub const LOCAL_ERROR_CODE: &str = "-1";

/// Errors raised while building, sending or decoding a request
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP request failed: {0}")]
    Transport(reqwest::Error),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::core::config::ConfigError),
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
                body: String::new(),
            }
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err)
        }
    }
}

/// Consumer-facing error delivered by the dispatcher.
///
/// Every failure source (envelope, transport, decoding) collapses into one of
/// these variants. The `Display` text is the message shown to a user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// The envelope reported failure
    #[error("{message}")]
    Business { code: String, message: String },

    /// The envelope reported success without a payload
    #[error("No response data")]
    EmptyData { code: String },

    #[error("Request timed out, please retry")]
    Timeout,

    #[error("Failed to connect to server")]
    ConnectionFailed,

    #[error("Network error ({0})")]
    HttpStatus(u16),

    #[error("Failed to parse response data")]
    MalformedPayload(String),

    #[error("{0}")]
    Unknown(String),
}

impl ApiError {
    /// Error code, `"-1"` for failures that never reached an envelope
    pub fn code(&self) -> &str {
        match self {
            Self::Business { code, .. } | Self::EmptyData { code } => code,
            _ => LOCAL_ERROR_CODE,
        }
    }

    /// Whether the error came from a well-formed envelope
    pub fn is_business(&self) -> bool {
        matches!(self, Self::Business { .. } | Self::EmptyData { .. })
    }

    pub fn unknown(message: Option<String>) -> Self {
        match message {
            Some(message) if !message.trim().is_empty() => Self::Unknown(message),
            _ => Self::Unknown("Unknown error".to_string()),
        }
    }
}

impl From<&HttpError> for ApiError {
    fn from(err: &HttpError) -> Self {
        match err {
            HttpError::Timeout(_) => Self::Timeout,
            HttpError::Connect(_) => Self::ConnectionFailed,
            HttpError::Status { status, .. } => Self::HttpStatus(*status),
            HttpError::Decode(detail) => Self::MalformedPayload(detail.clone()),
            HttpError::Json(e) => Self::MalformedPayload(e.to_string()),
            HttpError::Io(e) => match e.kind() {
                std::io::ErrorKind::TimedOut => Self::Timeout,
                std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::NotConnected => Self::ConnectionFailed,
                _ => Self::unknown(Some(e.to_string())),
            },
            other => Self::unknown(Some(other.to_string())),
        }
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        Self::from(&err)
    }
}
