use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("audit log i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode audit event: {0}")]
    Json(#[from] serde_json::Error),

    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, Error>;
