use thiserror::Error;

/// Errors produced by the appliance protocol layer.
#[derive(Debug, Error)]
pub enum NasError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("login failed: {0}")]
    Login(String),

    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("not connected")]
    NotConnected,

    #[error("discovery error: {0}")]
    Discovery(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("codec error: {0}")]
    Codec(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for NasError {
    fn from(e: serde_json::Error) -> Self {
        NasError::Codec(e.to_string())
    }
}

pub type NasResult<T> = Result<T, NasError>;
