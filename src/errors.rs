use thiserror::Error;

/// Errors that can occur while scanning documents or serving editor requests.
#[derive(Error, Debug)]
pub enum ReflensError {
    #[error("file error: {message} (path: {path})")]
    File { message: String, path: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("revision error: {message} (rev: {rev})")]
    Revision { message: String, rev: String },

    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for results using `ReflensError`.
pub type Result<T> = std::result::Result<T, ReflensError>;
