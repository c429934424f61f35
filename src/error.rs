use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] crate::api::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Session not initialized: create or attach an assistant first")]
    NotInitialized,

    #[error("A run is already in progress on this thread")]
    Busy,
}

pub type Result<T> = std::result::Result<T, Error>;
