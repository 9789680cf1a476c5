use std::{
    fs::read,
    path::{Path, PathBuf},
};

use apppack::{
    bundle::AssetBundle,
    config::AppConfig,
    error::{PackError, PackResult},
};
use clap::{Parser, Subcommand};
use console::style;
use staticfilemap::StaticFileMap;

#[derive(StaticFileMap)]
#[parse("env")]
#[names("APPPACK_TARGETS")]
#[files("APPPACK_FILES")]
#[compression(16)]
#[algorithm("zstd")]
struct RunnerMap;

#[derive(Parser)]
#[command(about, version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Pack a launcher, payload binaries, assets and a platform library into one executable
    Pack {
        /// Payload binary for this architecture, or x86_64 when --aarch64 is given
        binary:     PathBuf,
        /// Path to the output executable
        output:     PathBuf,
        /// Asset directory to bundle
        #[arg(short = 'a', long)]
        assets:     Option<PathBuf>,
        /// Already built bundle file to embed as is
        #[arg(short = 'b', long, conflicts_with_all = ["assets", "config", "obfuscate", "no_helper"])]
        bundle:     Option<PathBuf>,
        /// aarch64 payload binary, produces a universal container
        #[arg(long)]
        aarch64:    Option<PathBuf>,
        /// Platform shared library extracted next to the payload
        #[arg(short = 'l', long)]
        library:    Option<PathBuf>,
        /// Project configuration document embedded into the asset bundle
        #[arg(short = 'c', long)]
        config:     Option<PathBuf>,
        /// Obfuscate the bundled assets
        #[arg(short = 'o', long)]
        obfuscate:  bool,
        /// Do not inject the GPU helper script into the asset bundle
        #[arg(long)]
        no_helper:  bool,
        /// Which embedded runner to use as the launcher
        #[arg(short = 'r', long, default_value = "native")]
        runner:     String,
        /// Use this file as the launcher instead of an embedded runner
        #[arg(long, conflicts_with = "runner")]
        launcher:   Option<PathBuf>,
    },
    /// Build an asset bundle from a directory
    Bundle {
        /// Asset directory
        input:     PathBuf,
        /// Path to the output bundle
        output:    PathBuf,
        /// Project configuration document embedded into the bundle
        #[arg(short = 'c', long)]
        config:    Option<PathBuf>,
        /// Obfuscate the bundled assets
        #[arg(short = 'o', long)]
        obfuscate: bool,
        /// Do not inject the GPU helper script
        #[arg(long)]
        no_helper: bool,
    },
    /// Extract every entry of an asset bundle into a directory
    Unbundle {
        /// Bundle file
        input:  PathBuf,
        /// Target directory
        output: PathBuf,
    },
    /// Build a Debian package for an application binary
    Deb {
        /// Application binary, installed as /usr/local/bin/<name>
        binary:       PathBuf,
        /// Package and binary name [default: binary file name]
        #[arg(short = 'n', long)]
        name:         Option<String>,
        /// Package version [default: from --config, or 1.0.0]
        #[arg(short = 'v', long)]
        version:      Option<String>,
        /// Debian architecture
        #[arg(long, default_value = "amd64")]
        architecture: String,
        /// Maintainer field [default: "<name> maintainers <noreply@localhost>"]
        #[arg(long)]
        maintainer:   Option<String>,
        /// Package description [default: name]
        #[arg(long)]
        description:  Option<String>,
        /// Debian section
        #[arg(long, default_value = "games")]
        section:      String,
        /// Debian priority
        #[arg(long, default_value = "optional")]
        priority:     String,
        /// Asset bundle installed next to the binary
        #[arg(short = 'a', long)]
        assets:       Option<PathBuf>,
        /// Platform shared library installed next to the binary
        #[arg(short = 'l', long)]
        library:      Option<PathBuf>,
        /// PNG icon
        #[arg(short = 'i', long)]
        icon:         Option<PathBuf>,
        /// Project configuration document providing name and version defaults
        #[arg(short = 'c', long)]
        config:       Option<PathBuf>,
        /// Output file or directory [default: <name>_<version>_<architecture>.deb]
        #[arg(short = 'o', long)]
        output:       Option<PathBuf>,
    },
    /// Show the section layout of a packed executable
    Inspect {
        /// Packed executable
        input: PathBuf,
    },
    /// List the embedded runners
    Runners,
}

pub fn list_runners() {
    println!("{}:", style("available runners").blue().bright());
    println!(
        "  {} {}",
        RunnerMap::keys()[0],
        style("(default)").bold().dim()
    );
    for runner in &RunnerMap::keys()[1..] {
        println!("  {}", runner);
    }
}

pub fn get_runner_name(name: &str) -> PackResult<&'static str> {
    if name == "native" || name == "default" {
        return Ok(RunnerMap::keys()[0]);
    }
    RunnerMap::get_match_index(name)
        .map(|id| RunnerMap::keys()[id])
        .ok_or_else(|| PackError::UnknownRunner(name.to_string()))
}

/// Decompressed launcher: the embedded runner `name`, or the file given with `--launcher`.
pub fn get_launcher(name: &str, launcher: Option<&Path>) -> PackResult<(String, Vec<u8>)> {
    if let Some(launcher) = launcher {
        let source = get_input(launcher)?;
        return Ok((source.display().to_string(), read(&source)?));
    }
    let runner_name = get_runner_name(name)?;
    let runner =
        RunnerMap::get_match(runner_name).ok_or_else(|| PackError::UnknownRunner(runner_name.to_string()))?;
    Ok((runner_name.to_string(), zstd::stream::decode_all(runner)?))
}

/// Resolve an existing input path against the current directory.
pub fn get_input(input: &Path) -> PackResult<PathBuf> {
    let input = std::env::current_dir()?.join(input);
    std::fs::canonicalize(&input).map_err(|_| PackError::MissingInput { path: input })
}

pub fn get_input_dir(input: &Path) -> PackResult<PathBuf> {
    let input = get_input(input)?;
    if !input.is_dir() {
        return Err(PackError::NotADirectory { path: input });
    }
    Ok(input)
}

pub fn get_input_file(input: &Path) -> PackResult<PathBuf> {
    let input = get_input(input)?;
    if !input.is_file() {
        return Err(PackError::MissingInput { path: input });
    }
    Ok(input)
}

/// Resolve an output file path. Its parent directory has to exist.
pub fn get_output(output: &Path) -> PackResult<PathBuf> {
    let output = std::env::current_dir()?.join(output);
    if output.is_dir() {
        return Err(PackError::InvalidName(format!(
            "output path is a directory: {}",
            output.display()
        )));
    }
    let parent = output
        .parent()
        .filter(|parent| parent.is_dir())
        .ok_or_else(|| PackError::MissingInput {
            path: output.parent().unwrap_or(&output).to_path_buf(),
        })?;
    let name = output
        .file_name()
        .ok_or_else(|| PackError::InvalidName(output.display().to_string()))?;
    Ok(std::fs::canonicalize(parent)?.join(name))
}

pub fn get_config(config: Option<&Path>) -> PackResult<Option<AppConfig>> {
    config
        .map(|config| AppConfig::load(&get_input(config)?))
        .transpose()
}

/// Name of `path` without its extension, for defaults derived from the binary.
pub fn get_stem(path: &Path) -> PackResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| PackError::InvalidName(path.display().to_string()))
}

/// Read an already built bundle, making sure it parses before it gets embedded.
pub fn get_bundle_file(path: &Path) -> PackResult<Vec<u8>> {
    let data = read(path)?;
    AssetBundle::read(&data)?;
    Ok(data)
}

pub fn display_path(path: &Path) -> String {
    std::env::current_dir()
        .ok()
        .and_then(|dir| std::fs::canonicalize(dir).ok())
        .and_then(|dir| path.strip_prefix(dir).ok().map(Path::to_path_buf))
        .unwrap_or_else(|| path.to_path_buf())
        .display()
        .to_string()
}
