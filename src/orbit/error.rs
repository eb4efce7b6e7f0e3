use thiserror::Error;

use crate::remote::RemoteManagerError;

pub type Result<T> = core::result::Result<T, OrbitError>;

#[derive(Error, Debug)]
pub enum OrbitError {
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Remote manager error: {0}")]
    Remote(#[from] RemoteManagerError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}
