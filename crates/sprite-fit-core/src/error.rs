use thiserror::Error;

#[derive(Debug, Error)]
pub enum SpriteFitError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Malformed skeleton '{name}': {reason}")]
    MalformedSkeleton { name: String, reason: String },

    #[error("Malformed atlas at line {line}: {reason}")]
    MalformedAtlas { line: usize, reason: String },

    #[error("No image found for key '{key}'")]
    AssetMissing { key: String },

    #[error("Encoding error: {0}")]
    Encode(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Nothing to process: input list is empty")]
    Empty,

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, SpriteFitError>;
