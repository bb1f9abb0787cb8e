use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("Request timed out")]
    Timeout,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server rejected request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },

    #[error("Could not decode response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ClientError {
    /// Machine code reported by the server, if the request got that far.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Worth polling again later without user action.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Timeout | ClientError::Transport(_) => true,
            ClientError::Rejected { status, .. } => *status >= 500 && *status != 503,
            _ => false,
        }
    }

    /// Polling cannot make progress until the user intervenes.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClientError::Rejected { status: 401 | 403 | 503, .. }
        )
    }

    /// The server refused because of the queue's current state.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Rejected { status: 409, .. })
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}
