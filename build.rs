//! Builds the `apprun` launcher for each runner target and hands the binaries to the
//! `staticfilemap` derive in `src/args.rs` through `APPPACK_TARGETS` and `APPPACK_FILES`.

use std::{
    env::{var, var_os},
    path::{Path, PathBuf},
    process::Command,
};

const TARGETS_ENV: &str = "APPPACK_TARGETS";
const FILES_ENV: &str = "APPPACK_FILES";
const RUNNER_DIR: &str = "apprun";

type BuildResult<T> = Result<T, String>;

struct Runner {
    target: String,
    binary: PathBuf,
}

struct RunnerBuild {
    cargo:      PathBuf,
    rustc:      PathBuf,
    target:     String,
    release:    bool,
    target_dir: PathBuf,
}

fn env_path(name: &str) -> BuildResult<PathBuf> {
    var_os(name)
        .map(PathBuf::from)
        .ok_or_else(|| format!("{} is not set", name))
}

impl RunnerBuild {
    fn from_env() -> BuildResult<Self> {
        Ok(RunnerBuild {
            cargo:      env_path("CARGO")?,
            rustc:      env_path("RUSTC")?,
            target:     var("TARGET").map_err(|e| format!("TARGET: {}", e))?,
            release:    var("PROFILE").is_ok_and(|profile| profile == "release"),
            target_dir: env_path("OUT_DIR")?.join("runners"),
        })
    }

    fn known_targets(&self) -> BuildResult<Vec<String>> {
        let output = Command::new(&self.rustc)
            .args(["--print", "target-list"])
            .output()
            .map_err(|e| format!("couldn't list target triples: {}", e))?;
        let list = String::from_utf8(output.stdout).map_err(|_| "target list is not utf-8".to_string())?;
        Ok(list.lines().map(str::to_string).collect())
    }

    /// The packer's own target first, then each requested target once.
    fn targets(&self) -> BuildResult<Vec<String>> {
        let mut targets = vec![self.target.clone()];
        let requested = var(TARGETS_ENV).unwrap_or_default();
        let requested = requested
            .split(';')
            .map(str::trim)
            .filter(|target| !target.is_empty() && *target != self.target)
            .collect::<Vec<_>>();
        if requested.is_empty() {
            return Ok(targets);
        }
        let known = self.known_targets()?;
        for target in requested {
            if !known.iter().any(|known| known == target) {
                return Err(format!("unknown runner target {}", target));
            }
            if !targets.iter().any(|existing| existing == target) {
                targets.push(target.to_string());
            }
        }
        Ok(targets)
    }

    fn build(&self, target: &str) -> BuildResult<Runner> {
        let mut command = Command::new(&self.cargo);
        command
            .arg("build")
            .arg("--manifest-path")
            .arg(Path::new(RUNNER_DIR).join("Cargo.toml"))
            .args(["--target", target])
            .arg("--target-dir")
            .arg(&self.target_dir);
        if self.release {
            command.arg("--release");
        }
        let status = command
            .status()
            .map_err(|e| format!("couldn't run cargo for {}: {}", target, e))?;
        if !status.success() {
            return Err(format!("runner build for {} failed with {}", target, status));
        }

        let binary = self
            .target_dir
            .join(target)
            .join(if self.release { "release" } else { "debug" })
            .join(if target.contains("windows") { "apprun.exe" } else { "apprun" });
        if !binary.is_file() {
            return Err(format!("runner build for {} produced no {}", target, binary.display()));
        }
        Ok(Runner {
            target: target.to_string(),
            binary,
        })
    }
}

fn embed_runners() -> BuildResult<()> {
    let build = RunnerBuild::from_env()?;
    let runners = build
        .targets()?
        .iter()
        .map(|target| build.build(target))
        .collect::<BuildResult<Vec<_>>>()?;

    let targets = runners.iter().map(|runner| runner.target.as_str()).collect::<Vec<_>>();
    let files = runners
        .iter()
        .map(|runner| runner.binary.to_string_lossy())
        .collect::<Vec<_>>();
    println!("cargo:rustc-env={}={}", TARGETS_ENV, targets.join(";"));
    println!("cargo:rustc-env={}={}", FILES_ENV, files.join(";"));
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed={}/Cargo.toml", RUNNER_DIR);
    println!("cargo:rerun-if-changed={}/src", RUNNER_DIR);
    println!("cargo:rerun-if-env-changed={}", TARGETS_ENV);

    if let Err(e) = embed_runners() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
