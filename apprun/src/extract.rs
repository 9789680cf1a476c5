use std::{
    env::{consts, join_paths, split_paths, temp_dir, var_os},
    ffi::OsString,
    fs::{create_dir_all, rename, write},
    path::{Path, PathBuf},
};

use crate::{
    error::RunError,
    permissions::set_executable_permissions,
    types::{Layout, Section},
};

pub const RESOURCES_ENV: &str = "APP_RESOURCES_DIR";
pub const ASSETS_FILE: &str = "app-assets";

#[cfg(target_os = "windows")]
pub const LIBRARY_PATH_ENV: &str = "PATH";
#[cfg(target_os = "macos")]
pub const LIBRARY_PATH_ENV: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub const LIBRARY_PATH_ENV: &str = "LD_LIBRARY_PATH";

/// Where a process unpacks its sections.
#[derive(Debug, Clone)]
pub struct ExtractionContext {
    pub dir: PathBuf,
}

impl ExtractionContext {
    /// `<temp>/apppack_<pid>`. Concurrent instances never share a directory.
    pub fn for_process(pid: u32) -> Self {
        ExtractionContext {
            dir: temp_dir().join(format!("apppack_{}", pid)),
        }
    }

    pub fn binary_path(&self) -> PathBuf { self.dir.join(format!("app-binary{}", consts::EXE_SUFFIX)) }

    pub fn assets_path(&self) -> PathBuf { self.dir.join(ASSETS_FILE) }

    pub fn library_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}platform{}", consts::DLL_PREFIX, consts::DLL_SUFFIX))
    }
}

#[derive(Debug, Clone)]
pub struct Extracted {
    pub dir:     PathBuf,
    pub binary:  PathBuf,
    pub assets:  Option<PathBuf>,
    pub library: Option<PathBuf>,
}

impl Extracted {
    /// Variables set on the payload process only.
    pub fn environment(&self) -> Vec<(OsString, OsString)> {
        let mut env = vec![(OsString::from(RESOURCES_ENV), self.dir.clone().into_os_string())];
        if self.library.is_some() {
            let mut paths = vec![self.dir.clone()];
            if let Some(existing) = var_os(LIBRARY_PATH_ENV) {
                paths.extend(split_paths(&existing));
            }
            match join_paths(paths) {
                Ok(joined) => env.push((OsString::from(LIBRARY_PATH_ENV), joined)),
                Err(e) => debug_log!("not extending {}: {}", LIBRARY_PATH_ENV, e),
            }
        }
        env
    }
}

/// Write the payload for `arch` and the optional sections of `file` into the context
/// directory. The payload section is resolved before anything touches the disk.
pub fn extract(file: &[u8], layout: &Layout, context: &ExtractionContext, arch: &str) -> Result<Extracted, RunError> {
    let payload = layout.payload_for(arch)?;
    let binary = layout
        .slice(file, payload)
        .ok_or(RunError::MissingSection(payload.name()))?;
    debug_log!("extracting {} payload to {}", payload.name(), context.dir.display());

    create_dir_all(&context.dir)?;
    let binary_path = context.binary_path();
    write_replacing(&binary_path, binary)?;
    set_executable_permissions(&binary_path)?;

    let assets = match layout.slice(file, Section::Assets) {
        Some(data) => {
            let path = context.assets_path();
            write_replacing(&path, data)?;
            Some(path)
        }
        None => None,
    };
    let library = match layout.slice(file, Section::Library) {
        Some(data) => {
            let path = context.library_path();
            write_replacing(&path, data)?;
            set_executable_permissions(&path)?;
            Some(path)
        }
        None => None,
    };

    Ok(Extracted {
        dir: context.dir.clone(),
        binary: binary_path,
        assets,
        library,
    })
}

/// Write beside `path` and rename over it, so a file left by an earlier run is replaced
/// even while it is still executing.
fn write_replacing(path: &Path, data: &[u8]) -> Result<(), RunError> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".partial");
    let partial = PathBuf::from(partial);
    write(&partial, data)?;
    rename(&partial, path)?;
    Ok(())
}
