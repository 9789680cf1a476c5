use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("input does not exist: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("name is longer than {limit} bytes: {name}")]
    NameTooLong { name: String, limit: usize },

    #[error("{what} is too large for its field: {size}")]
    SizeTooLarge { what: &'static str, size: u64 },

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("truncated {0}")]
    Truncated(&'static str),

    #[error("{0} bytes of trailing data after the last bundle record")]
    TrailingData(usize),

    #[error("bad magic: {0}")]
    InvalidMagic(&'static str),

    #[error("bundle is marked as obfuscated but carries no key")]
    MissingKey,

    #[error("corrupted {what}: {detail}")]
    Corrupted { what: &'static str, detail: String },

    #[error("section {0} is present but empty")]
    EmptySection(&'static str),

    #[error("required section {0} is missing")]
    MissingSection(&'static str),

    #[error("section {section} has no slot in the {variant} layout")]
    UnsupportedSection { section: &'static str, variant: &'static str },

    #[error("no embedded runner for target {0}")]
    UnknownRunner(String),

    #[error("config: {0}")]
    Config(#[from] serde_json::Error),
}

pub type PackResult<T> = Result<T, PackError>;

impl PackError {
    pub(crate) fn corrupted(what: &'static str, detail: impl Into<String>) -> Self {
        PackError::Corrupted {
            what,
            detail: detail.into(),
        }
    }
}
