use thiserror::Error;

/// Failures reported by a storage driver.
///
/// These never cross the entry API as `Result`s: entries absorb them into
/// boolean returns and resynchronize against storage instead.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage backend failure: {message}")]
    Backend { message: String },
    #[error("storage backend unavailable")]
    Unavailable,
}

impl StorageError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}
