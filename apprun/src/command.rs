use std::{
    ffi::{OsStr, OsString},
    path::Path,
    process::{Command, ExitStatus, Stdio},
};

use crate::error::RunError;

/// Run `path` with inherited standard streams and wait for it. Returns the exit code to
/// forward.
pub fn run<I, S>(path: &Path, args: I, env: &[(OsString, OsString)]) -> Result<i32, RunError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new(path);
    command
        .args(args)
        .envs(env.iter().map(|(key, value)| (key, value)))
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    let status = command.status().map_err(|source| RunError::Spawn {
        path: path.to_path_buf(),
        source,
    })?;
    debug_log!("{} exited with {}", path.display(), status);
    Ok(exit_code(status))
}

/// The child's exit code, or `128 + signal` when it was killed by a signal.
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, env: &[(OsString, OsString)]) -> Result<i32, RunError> {
        run(Path::new("/bin/sh"), ["-c", script], env)
    }

    #[test]
    fn forwards_exit_code() {
        assert_eq!(sh("exit 0", &[]).unwrap(), 0);
        assert_eq!(sh("exit 42", &[]).unwrap(), 42);
    }

    #[test]
    fn signal_maps_to_128_plus_signal() {
        assert_eq!(sh("kill -TERM $$", &[]).unwrap(), 128 + 15);
    }

    #[test]
    fn environment_reaches_the_child() {
        let env = [(OsString::from("APP_RESOURCES_DIR"), OsString::from("/tmp/apppack_1"))];
        assert_eq!(sh(r#"test "$APP_RESOURCES_DIR" = /tmp/apppack_1"#, &env).unwrap(), 0);
    }

    #[test]
    fn spawn_failure_carries_os_error() {
        let error = run(Path::new("/nonexistent/apprun-payload"), Vec::<&str>::new(), &[]).unwrap_err();
        assert!(matches!(error, RunError::Spawn { .. }));
        assert_eq!(error.exit_code(), 2);
    }
}
