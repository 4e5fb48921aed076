#![forbid(unsafe_code)]

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanwatchError {
    #[error("task id must not be empty")]
    EmptyTaskId,

    #[error("task {0} is not on the board")]
    RowDetached(String),

    #[error("task {0} cannot be stopped right now")]
    NotStoppable(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Failures talking to the dashboard server.
///
/// `Rejected` is the only application-level variant: the server answered
/// with `{"status": "error"}`. Everything else means the request or its body
/// never made it through.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    HttpStatus { status: u16, url: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("{0}")]
    Rejected(String),
}

impl ApiError {
    #[must_use]
    pub fn is_transport(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }
}
