use thiserror::Error;

// Outcome error shared by every caller of a deduplicated request, hence Clone
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("api error: {0}")]
    Api(String),
    #[error("response decode error: {0}")]
    Decode(String),
    #[error("request aborted: {0}")]
    Aborted(String),
    #[error("request manager is shut down")]
    ManagerClosed,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl RequestError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RequestError::Unauthorized(_))
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RequestError::Timeout
        } else if err.is_decode() {
            RequestError::Decode(err.to_string())
        } else {
            RequestError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum SettingsError {
    #[error("settings fetch failed: {0}")]
    Fetch(#[from] RequestError),
    #[error("settings parse error: {0}")]
    Parse(String),
}
