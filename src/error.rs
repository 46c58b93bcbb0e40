use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("node id must be nonzero")]
    InvalidId,

    #[error("cluster size must be at least 1")]
    InvalidClusterSize,

    #[error("encryption key must be empty or exactly 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("invalid address `{0}`")]
    InvalidAddress(String),

    #[error("listen address is not set")]
    MissingListenAddress,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
