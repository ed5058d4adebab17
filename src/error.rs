use std::path::PathBuf;

use thiserror::Error;

use crate::BoundingBox;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load model {}: {source}", path.display())]
    ModelLoad {
        path: PathBuf,
        #[source]
        source: ort::Error,
    },
    #[error("failed to load tokenizer {}: {message}", path.display())]
    Tokenizer { path: PathBuf, message: String },
    #[error("inference failed: {0}")]
    Inference(#[from] ort::Error),
    #[error("unexpected model output: {0}")]
    ModelOutput(String),
    #[error("failed to decode tokens: {0}")]
    TokenDecode(String),
    #[error("failed to decode image {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("region {0:?} lies outside the image")]
    EmptyCrop(BoundingBox),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
