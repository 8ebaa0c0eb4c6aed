use thiserror::Error;

/// Errors produced while ingesting an attachment.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("Empty media payload")]
    Empty,

    #[error("Media too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
