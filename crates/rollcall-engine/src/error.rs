use thiserror::Error;

/// Engine-level error taxonomy.
///
/// Input errors (`Decode`, `NoFace`, `AmbiguousFace`) are
/// caller-correctable and never mutate state. A non-confident match is
/// not an error: recognition reports "Unknown" through its result list.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("identity must be a non-empty name")]
    EmptyIdentity,
    #[error(transparent)]
    Decode(#[from] rollcall_core::FrameError),
    #[error("no face found in frame")]
    NoFace,
    #[error("found {0} faces, enrollment needs exactly one")]
    AmbiguousFace(usize),
    #[error("identity not enrolled: {0}")]
    NotFound(String),
    #[error("identity already enrolled: {0}")]
    Conflict(String),
    #[error("encoding store I/O: {0}")]
    StoreIo(#[from] std::io::Error),
    #[error("encoding store serialization: {0}")]
    StoreEncode(#[from] serde_json::Error),
    #[error("attendance ledger: {0}")]
    Ledger(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
