//! In-memory files shared by the TAR builder and the asset bundle builder.

use std::{
    fs::{metadata, read},
    path::Path,
    time::SystemTime,
};

use crate::error::{PackError, PackResult};

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const EXECUTABLE_MODE: u32 = 0o755;
const MODE_MASK: u32 = 0o7777;

/// A single file to be archived.
///
/// `path` is always forward-slash separated. Field-width limits are checked by the
/// format that serializes the entry, not here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path:  String,
    pub mode:  u32,
    pub mtime: u64,
    pub data:  Vec<u8>,
}

impl ArchiveEntry {
    pub fn new(path: &str, mode: u32, mtime: u64, data: Vec<u8>) -> PackResult<Self> {
        let path = normalize_path(path);
        if path.is_empty() {
            return Err(PackError::InvalidName("empty entry path".into()));
        }
        if mode & !MODE_MASK != 0 {
            return Err(PackError::InvalidName(format!(
                "mode {:o} of {} does not fit in 12 bits",
                mode, path
            )));
        }
        Ok(ArchiveEntry {
            path,
            mode,
            mtime,
            data,
        })
    }

    /// Read `source` from disk and store it under `path`.
    ///
    /// When `mode` is `None` the permission bits of the source file are used on unix and
    /// `DEFAULT_FILE_MODE` elsewhere.
    pub fn from_file(source: &Path, path: &str, mode: Option<u32>) -> PackResult<Self> {
        if !source.is_file() {
            return Err(PackError::MissingInput {
                path: source.to_path_buf(),
            });
        }
        let meta = metadata(source)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|modified| modified.duration_since(SystemTime::UNIX_EPOCH).ok())
            .map(|modified| modified.as_secs())
            .unwrap_or_else(unix_now);
        let mode = mode.unwrap_or_else(|| source_mode(&meta));
        ArchiveEntry::new(path, mode, mtime, read(source)?)
    }

    pub fn len(&self) -> u64 { self.data.len() as u64 }

    pub fn is_empty(&self) -> bool { self.data.is_empty() }
}

pub fn normalize_path(path: &str) -> String { path.replace('\\', "/") }

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|now| now.as_secs())
        .unwrap_or(0)
}

#[cfg(any(unix, target_os = "redox"))]
fn source_mode(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & MODE_MASK
}

#[cfg(not(any(unix, target_os = "redox")))]
fn source_mode(_: &std::fs::Metadata) -> u32 { DEFAULT_FILE_MODE }
