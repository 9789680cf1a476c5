use std::{
    ffi::OsString,
    fs::{remove_file, rename, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::error::PackResult;

/// An output file written under a temporary `.tmp` name and moved into place on `commit`.
///
/// Dropping it without committing removes the temporary file, so a failed run never leaves
/// a file under the final name.
pub struct PartialOutput {
    target:     PathBuf,
    temporary:  PathBuf,
    writer:     Option<BufWriter<File>>,
    executable: bool,
    committed:  bool,
}

impl PartialOutput {
    pub fn create(target: &Path) -> PackResult<Self> {
        let mut name = target.file_name().map(OsString::from).unwrap_or_default();
        name.push(".tmp");
        let temporary = target.with_file_name(name);
        let writer = BufWriter::new(File::create(&temporary)?);
        Ok(PartialOutput {
            target: target.to_path_buf(),
            temporary,
            writer: Some(writer),
            executable: false,
            committed: false,
        })
    }

    /// Mark the output as a program: `commit` adds the execute bits before moving it into place.
    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn commit(mut self) -> PackResult<PathBuf> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        if self.executable {
            set_executable_permissions(&self.temporary)?;
        }
        rename(&self.temporary, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

#[cfg(unix)]
fn set_executable_permissions(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
fn set_executable_permissions(_path: &Path) -> std::io::Result<()> { Ok(()) }

impl Write for PartialOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.writer {
            Some(writer) => writer.write(buf),
            None => Err(std::io::Error::other("output already committed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.writer {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if !self.committed {
            drop(self.writer.take());
            let _ = remove_file(&self.temporary);
        }
    }
}

/// Write `data` to `target` through a `PartialOutput`.
pub fn write_output(target: &Path, data: &[u8]) -> PackResult<PathBuf> {
    let mut output = PartialOutput::create(target)?;
    output.write_all(data)?;
    output.commit()
}
