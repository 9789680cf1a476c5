//! Asset bundles: a directory tree flattened into one length-prefixed blob.
//!
//! Layout, all integers little-endian:
//! - obfuscated bundles only: `[MAGIC 8][key 32]`
//! - `[u32 record count]`
//! - per record: `[u32 path length][path bytes UTF-8][u64 data length][data]`
//!
//! Obfuscation XORs every record's data with the key rotated by position. The key is stored
//! right next to the data it hides, so this only discourages casual inspection and is NOT
//! encryption. Anything needing confidentiality must hold its key outside the bundle.

use std::{
    fs::{create_dir_all, read, write},
    path::{Component, Path},
};

use indexmap::IndexMap;
use jwalk::WalkDir;
use path_slash::PathExt;
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::{
    config::AppConfig,
    entry::{unix_now, ArchiveEntry, DEFAULT_FILE_MODE},
    error::{PackError, PackResult},
};

/// File name of an extracted or installed bundle.
pub const ASSETS_FILE: &str = "app-assets";
pub const CONFIG_ENTRY: &str = "app.config.json";
pub const HELPER_ENTRY: &str = "apppack-gpu-helper.js";
pub const HELPER_SCRIPT: &str = include_str!("../assets/gpu-helper.js");

pub const MAGIC: [u8; 8] = *b"APPACK1\0";
pub const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;
pub const MAX_PATH_LEN: usize = 4096;

#[derive(Clone, PartialEq, Eq)]
pub struct ObfuscationKey([u8; KEY_SIZE]);

impl std::fmt::Debug for ObfuscationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str("ObfuscationKey(..)") }
}

impl ObfuscationKey {
    /// SHA-256 of the project identifier and a fresh random salt.
    pub fn derive(project_id: &str) -> Self {
        let mut salt = [0u8; SALT_SIZE];
        rand::rng().fill(&mut salt);
        Self::derive_with_salt(project_id, &salt)
    }

    pub fn derive_with_salt(project_id: &str, salt: &[u8]) -> Self {
        let digest: [u8; KEY_SIZE] = Sha256::new()
            .chain_update(project_id.as_bytes())
            .chain_update(salt)
            .finalize()
            .into();
        ObfuscationKey(digest)
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self { ObfuscationKey(bytes) }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] { &self.0 }

    /// XOR `data` in place. Applying the key twice restores the input.
    pub fn apply(&self, data: &mut [u8]) {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte ^= self.0[(i + (i >> 8)) % KEY_SIZE];
        }
    }
}

/// Collects entries and serializes them into a bundle.
///
/// Paths are unique. Generated entries (the helper script and the configuration document)
/// are added last and replace any walked file with the same path.
#[derive(Debug)]
pub struct BundleBuilder {
    entries: IndexMap<String, ArchiveEntry>,
    config:  Option<AppConfig>,
    key:     Option<ObfuscationKey>,
    helper:  bool,
}

impl Default for BundleBuilder {
    fn default() -> Self { Self::new() }
}

impl BundleBuilder {
    pub fn new() -> Self {
        BundleBuilder {
            entries: IndexMap::new(),
            config:  None,
            key:     None,
            helper:  true,
        }
    }

    /// Do not inject the GPU helper script.
    pub fn without_helper(mut self) -> Self {
        self.helper = false;
        self
    }

    pub fn config(&mut self, config: AppConfig) -> &mut Self {
        self.config = Some(config);
        self
    }

    pub fn obfuscate(&mut self, key: ObfuscationKey) -> &mut Self {
        self.key = Some(key);
        self
    }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Add an entry, returning the entry it replaced.
    pub fn add(&mut self, entry: ArchiveEntry) -> Option<ArchiveEntry> {
        if let Some(index) = self.entries.get_index_of(&entry.path) {
            // keep the original walk position of the path
            return self.entries.get_index_mut(index).map(|(_, slot)| std::mem::replace(slot, entry));
        }
        self.entries.insert(entry.path.clone(), entry);
        None
    }

    /// Walk `root` depth-first and add every regular file under its relative path.
    /// Returns the number of files added.
    ///
    /// Unreadable entries abort the walk. Symlinks and other special files are skipped and
    /// reported through `error_callback`.
    pub fn add_dir<P: Fn(), E: Fn(&str), I: Fn(&str)>(
        &mut self, root: &Path, progress_callback: P, error_callback: E, info_callback: I,
    ) -> PackResult<usize> {
        if !root.is_dir() {
            return Err(PackError::MissingInput {
                path: root.to_path_buf(),
            });
        }
        let mut added = 0;
        for entry in WalkDir::new(root).skip_hidden(false).sort(true) {
            let entry = entry.map_err(|e| PackError::Io(std::io::Error::other(e.to_string())))?;
            if entry.depth == 0 || entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .map_err(|_| PackError::InvalidName(path.display().to_string()))?;
            let name = relative
                .to_slash()
                .ok_or_else(|| PackError::InvalidName(relative.display().to_string()))?
                .into_owned();
            if !entry.file_type().is_file() {
                error_callback(&format!("skipping non-regular file: {}", name));
                continue;
            }
            info_callback(&name);
            let entry = ArchiveEntry::from_file(&path, &name, None)?;
            if self.add(entry).is_some() {
                error_callback(&format!("replaced duplicate entry: {}", name));
            }
            added += 1;
            progress_callback();
        }
        Ok(added)
    }

    /// Serialize the bundle. Paths replaced by generated entries are reported through
    /// `error_callback`.
    pub fn build<E: Fn(&str)>(mut self, error_callback: E) -> PackResult<Vec<u8>> {
        let mut generated = Vec::new();
        if self.helper {
            generated.push(ArchiveEntry::new(
                HELPER_ENTRY,
                DEFAULT_FILE_MODE,
                unix_now(),
                HELPER_SCRIPT.as_bytes().to_vec(),
            )?);
        }
        if let Some(config) = &self.config {
            generated.push(ArchiveEntry::new(
                CONFIG_ENTRY,
                DEFAULT_FILE_MODE,
                unix_now(),
                config.to_json()?.into_bytes(),
            )?);
        }
        for entry in generated {
            // generated entries always go to the end
            if self.entries.shift_remove(&entry.path).is_some() {
                error_callback(&format!(
                    "asset {} is replaced by the generated entry of the same name",
                    entry.path
                ));
            }
            self.entries.insert(entry.path.clone(), entry);
        }

        let records = self
            .entries
            .values()
            .map(|entry| (entry.path.as_str(), entry.data.as_slice()))
            .collect::<Vec<_>>();
        serialize(&records, self.key.as_ref())
    }
}

/// Serialize `(path, data)` records in order, obfuscating data when a key is given.
pub fn serialize(records: &[(&str, &[u8])], key: Option<&ObfuscationKey>) -> PackResult<Vec<u8>> {
    let count = u32::try_from(records.len()).map_err(|_| PackError::SizeTooLarge {
        what: "bundle record count",
        size: records.len() as u64,
    })?;
    for (path, _) in records {
        if path.is_empty() || path.len() > MAX_PATH_LEN {
            return Err(PackError::NameTooLong {
                name:  path.to_string(),
                limit: MAX_PATH_LEN,
            });
        }
    }

    let header = if key.is_some() { MAGIC.len() + KEY_SIZE } else { 0 };
    let size = header
        + 4
        + records
            .iter()
            .map(|(path, data)| 4 + path.len() + 8 + data.len())
            .sum::<usize>();
    let mut out = Vec::with_capacity(size);
    if let Some(key) = key {
        out.extend_from_slice(&MAGIC);
        out.extend_from_slice(key.as_bytes());
    }
    out.extend_from_slice(&count.to_le_bytes());
    for (path, data) in records {
        out.extend_from_slice(&(path.len() as u32).to_le_bytes());
        out.extend_from_slice(path.as_bytes());
        out.extend_from_slice(&(data.len() as u64).to_le_bytes());
        let start = out.len();
        out.extend_from_slice(data);
        if let Some(key) = key {
            key.apply(&mut out[start..]);
        }
    }
    debug_assert_eq!(out.len(), size);
    Ok(out)
}

struct Reader<'a> {
    bytes:    &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize, what: &'static str) -> PackResult<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or(PackError::Truncated(what))?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    fn u32(&mut self, what: &'static str) -> PackResult<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4, what)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self, what: &'static str) -> PackResult<u64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8, what)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn remaining(&self) -> usize { self.bytes.len() - self.position }
}

/// A parsed bundle with de-obfuscated contents, in record order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetBundle {
    entries:    IndexMap<String, Vec<u8>>,
    obfuscated: bool,
}

impl AssetBundle {
    pub fn open(path: &Path) -> PackResult<Self> {
        if !path.is_file() {
            return Err(PackError::MissingInput {
                path: path.to_path_buf(),
            });
        }
        Self::read(&read(path)?)
    }

    /// Parse exactly the declared number of records. Missing bytes and bytes left over after
    /// the last record are both errors.
    pub fn read(bytes: &[u8]) -> PackResult<Self> {
        let mut reader = Reader { bytes, position: 0 };
        let key = if bytes.starts_with(&MAGIC) {
            reader.position = MAGIC.len();
            let key = reader.take(KEY_SIZE, "bundle key").map_err(|_| PackError::MissingKey)?;
            let mut buf = [0u8; KEY_SIZE];
            buf.copy_from_slice(key);
            Some(ObfuscationKey(buf))
        } else {
            None
        };

        let count = reader.u32("bundle record count")?;
        let mut entries = IndexMap::new();
        for index in 0..count {
            let path_len = reader.u32("bundle path length")? as usize;
            if path_len == 0 || path_len > MAX_PATH_LEN {
                return Err(PackError::corrupted(
                    "bundle record",
                    format!("record {} has path length {}", index, path_len),
                ));
            }
            let path = std::str::from_utf8(reader.take(path_len, "bundle path")?)
                .map_err(|_| {
                    PackError::corrupted("bundle record", format!("record {} path is not utf8", index))
                })?
                .to_string();
            let data_len = reader.u64("bundle data length")?;
            let data_len = usize::try_from(data_len).map_err(|_| PackError::Truncated("bundle data"))?;
            let mut data = reader.take(data_len, "bundle data")?.to_vec();
            if let Some(key) = &key {
                key.apply(&mut data);
            }
            entries.insert(path, data);
        }
        if reader.remaining() != 0 {
            return Err(PackError::TrailingData(reader.remaining()));
        }

        Ok(AssetBundle {
            entries,
            obfuscated: key.is_some(),
        })
    }

    pub fn is_obfuscated(&self) -> bool { self.obfuscated }

    pub fn len(&self) -> usize { self.entries.len() }

    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    pub fn get(&self, path: &str) -> Option<&[u8]> { self.entries.get(path).map(Vec::as_slice) }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries
            .iter()
            .map(|(path, data)| (path.as_str(), data.as_slice()))
    }

    /// The embedded configuration document, if any.
    pub fn config(&self) -> PackResult<Option<AppConfig>> {
        self.get(CONFIG_ENTRY)
            .map(|data| {
                let json = std::str::from_utf8(data)
                    .map_err(|_| PackError::corrupted("bundle config", "not utf8"))?;
                AppConfig::from_json(json)
            })
            .transpose()
    }

    /// Write every entry below `target`. Returns the number of files written.
    ///
    /// All paths are checked before anything is written.
    pub fn extract_to(&self, target: &Path) -> PackResult<usize> {
        for path in self.entries.keys() {
            let relative = Path::new(path);
            let safe = relative
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
            if !safe {
                return Err(PackError::InvalidName(format!(
                    "bundle entry escapes the target directory: {}",
                    path
                )));
            }
        }
        for (path, data) in &self.entries {
            let destination = target.join(path);
            if let Some(parent) = destination.parent() {
                create_dir_all(parent)?;
            }
            write(&destination, data)?;
        }
        Ok(self.entries.len())
    }
}
