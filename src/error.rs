use thiserror::Error;

/// Problems with a line the user typed. Reported as a single error line;
/// the session stays idle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Missing required argument {0}")]
    MissingArgument(&'static str),

    #[error("Missing value for {0}")]
    MissingValue(String),

    #[error("Invalid value for {flag}: {value}")]
    InvalidValue { flag: String, value: String },

    #[error("Unknown flag {0}")]
    UnknownFlag(String),

    #[error("Flag {0} given more than once")]
    DuplicateFlag(String),

    #[error("Unexpected argument {0}")]
    UnexpectedArgument(String),
}

/// Failures of a single remote call (provider or Terminus service).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Empty response from model")]
    EmptyBody,

    #[error("Received HTML instead of JSON")]
    Html,

    #[error("Response is not a JSON object: {0}")]
    NotJson(String),

    #[error("Failed to parse response: {0}")]
    Malformed(String),

    #[error("API key not configured ({0})")]
    MissingApiKey(String),

    /// The remote side answered with `success: false`.
    #[error("{0}")]
    Remote(String),
}

/// Longest slice of a response body carried inside an error message.
pub const BODY_PREVIEW_CHARS: usize = 200;

pub fn preview(body: &str) -> String {
    body.chars().take(BODY_PREVIEW_CHARS).collect()
}

impl ClientError {
    pub fn from_status(status: u16, body: &str) -> Self {
        Self::Status {
            status,
            body: preview(body.trim()),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Request(format!("Connection failed: {}", err))
        } else {
            Self::Request(err.to_string())
        }
    }
}
