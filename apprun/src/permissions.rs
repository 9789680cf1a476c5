use std::path::Path;

#[cfg(any(unix, target_os = "redox"))]
pub fn set_executable_permissions(path: &Path) -> std::io::Result<()> {
    use ::std::{
        fs::{metadata, set_permissions, Permissions},
        os::unix::prelude::*,
    };
    let mut perm: Permissions = metadata(path)?.permissions();
    perm.set_mode(perm.mode() | 0o111);
    set_permissions(path, perm)
}

#[cfg(not(any(unix, target_os = "redox")))]
pub fn set_executable_permissions(_: &Path) -> std::io::Result<()> { Ok(()) }
