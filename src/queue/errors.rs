use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("must be authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Transport(String),

    #[error("{0}")]
    Metadata(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Server error: status code {status_code}, message: {message}")]
    ServerError {
        status_code: u16,
        message: String,
    },

    #[error("HTTP Request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Param error: {0}")]
    ParamError(String),

    #[error("Upload was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl UploadError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// Wrap a blob store failure, keeping errors that are already classified
    pub fn transport(err: UploadError) -> Self {
        match err {
            Self::Transport(_) | Self::NotAuthenticated | Self::Cancelled => err,
            other => Self::Transport(other.to_string()),
        }
    }

    /// Wrap a record sink failure
    pub fn metadata(err: UploadError) -> Self {
        match err {
            Self::Metadata(_) | Self::Cancelled => err,
            other => Self::Metadata(other.to_string()),
        }
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
