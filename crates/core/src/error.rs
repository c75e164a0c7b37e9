use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlarmError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data source error for '{identifier}': {message}")]
    DataSource { identifier: String, message: String },

    #[error("Timed out resolving '{0}'")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AlarmError>;
