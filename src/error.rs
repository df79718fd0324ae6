use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// The IP list source stayed unreachable or kept returning errors
    /// through every retry attempt.
    #[error("ip list fetch failed after {attempts} attempt(s): {message}")]
    Fetch { attempts: u32, message: String },

    /// The zero trust API rejected a call outright or returned a structured
    /// error payload inside a 2xx envelope.
    #[error("zero trust api error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("no account selected")]
    NoAccountSelected,

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("state store error: {0}")]
    Store(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}
