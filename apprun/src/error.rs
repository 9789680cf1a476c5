use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("couldn't locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is too small to hold a container trailer")]
    Truncated,

    #[error("container trailer magic is invalid")]
    InvalidMagic,

    #[error("container is corrupted: {0}")]
    Corrupted(String),

    #[error("section {0} is present but empty")]
    EmptySection(&'static str),

    #[error("required section {0} is missing")]
    MissingSection(&'static str),

    #[error("couldn't start {}: {source}", path.display())]
    Spawn {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Process exit code for a failed launch. Spawn failures carry the OS error code.
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Spawn { source, .. } => source.raw_os_error().filter(|&code| code != 0).unwrap_or(1),
            _ => 1,
        }
    }
}
