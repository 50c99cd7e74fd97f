use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced to the caller.
///
/// Broken preconditions (misaligned feature sequences, out of range feature indices)
/// panic instead, and routine policy outcomes such as rejected pairs are reported as values.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unable to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Stream(#[from] std::io::Error),
    #[error("unable to load image: {0}")]
    Image(#[from] image::ImageError),
    #[error("malformed correspondence file at line {line}: {reason}")]
    Parse { line: usize, reason: String },
    #[error("exhaustive matching needs at least two images, but {0} were added")]
    NotEnoughImages(usize),
    #[error("invalid settings: {0}")]
    Settings(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
