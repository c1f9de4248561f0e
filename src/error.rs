use std::path::PathBuf;

use burn::record::RecorderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed metadata: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to decode {path}: {message}")]
    Wav { path: PathBuf, message: String },

    #[error("fold {fold} of {filename} is outside 1..=5")]
    InvalidFold { filename: String, fold: u32 },

    #[error("audio file {0} does not exist")]
    MissingAudio(PathBuf),

    #[error("category {0:?} is not in the class vocabulary")]
    UnknownCategory(String),

    #[error("clip index {index} out of range for {len} clips")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("the {0} split has no clips")]
    EmptySplit(&'static str),

    #[error("clip has {len} samples, need more than {min}")]
    ClipTooShort { len: usize, min: usize },

    #[error("feature shape {found:?} does not match {expected:?} in the same batch")]
    ShapeMismatch {
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    #[error("batched features must be [1, n_mels, frames], got {0:?}")]
    FeatureRank(Vec<usize>),

    #[error("cannot build an empty batch")]
    EmptyBatch,

    #[error("checkpoint error: {0:?}")]
    Checkpoint(RecorderError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("learning rate schedule exhausted after {0} steps")]
    Schedule(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
