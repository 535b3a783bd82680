use thiserror::Error;

use crate::hash::Ref;

/// Generic `prolly_store` error
#[derive(Error, Debug)]
pub enum Error {
    #[error("Generic IO error")]
    Io(#[from] std::io::Error),

    #[error("chunk {0} failed to decode as a value")]
    Decode(Ref),

    #[error("chunk {0} references {1}, which is not present in the store")]
    MissingReference(Ref, Ref),

    #[error("store cannot accept more chunks right now, retry")]
    Backpressure,

    #[error("invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("invalid bitcode payload")]
    Bitcode(#[from] bitcode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
