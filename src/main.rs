use std::{
    fs::read,
    path::{Path, PathBuf},
    time::Duration,
};

use apppack::{
    bundle::{AssetBundle, BundleBuilder, ObfuscationKey},
    config::AppConfig,
    container::{self, ContainerLayout, Payloads, SectionId},
    deb::{application_package, ApplicationFiles, ControlFields},
    error::PackResult,
    output::write_output,
};
use clap::Parser;
use console::{style, Emoji};
use indicatif::{ProgressBar, ProgressStyle};
use jwalk::WalkDir;

mod args;
use args::*;

fn step(current: usize, total: usize, emoji: &str, message: impl std::fmt::Display) {
    println!(
        "{} {}{}",
        style(format!("[{}/{}]", current, total)).bold().black(),
        Emoji(emoji, ""),
        message
    );
}

fn done() {
    println!("      {} {}", Emoji("✨ ", ""), style("done!").green());
}

fn build_bundle(
    source: &Path, config: Option<AppConfig>, obfuscate: bool, helper: bool, fallback_id: &str,
) -> PackResult<Vec<u8>> {
    let count = WalkDir::new(source)
        .skip_hidden(false)
        .into_iter()
        .filter(|entry| entry.as_ref().is_ok_and(|entry| entry.file_type().is_file()))
        .count() as u64;

    let mut builder = BundleBuilder::new();
    if !helper {
        builder = builder.without_helper();
    }
    if obfuscate {
        let project_id = config
            .as_ref()
            .map(|config| config.project_id().to_string())
            .unwrap_or_else(|| fallback_id.to_string());
        builder.obfuscate(ObfuscationKey::derive(&project_id));
    }
    if let Some(config) = config {
        builder.config(config);
    }

    let bar_progress = ProgressBar::new(count).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {elapsed_precise} [{wide_bar:.green}] {pos}/{len}\n{spinner:.green} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar_progress.enable_steady_tick(Duration::from_millis(12));
    let warn = |message: &str| {
        bar_progress.println(format!("      {}{}", Emoji("⚠ ", ""), style(message).red()));
    };
    let added = builder.add_dir(
        source,
        || bar_progress.inc(1),
        warn,
        |message| bar_progress.set_message(format!("{}", style(message).blue())),
    );
    bar_progress.finish_and_clear();
    let added = added?;

    let bundle = builder.build(|message| {
        println!("      {}{}", Emoji("⚠ ", ""), style(message).red());
    })?;
    println!(
        "      {}{} {} {}{}",
        Emoji("✨ ", ""),
        style("bundled").green(),
        style(added).magenta(),
        style("files").green(),
        if obfuscate {
            style(" (obfuscated)".to_string()).dim()
        } else {
            style(String::new())
        }
    );
    Ok(bundle)
}

fn print_layout(layout: &ContainerLayout) {
    let launcher_end = layout
        .sections
        .first()
        .map(|section| section.offset)
        .unwrap_or(layout.trailer_offset);
    println!(
        "      {} container, {} bytes",
        style(layout.variant.name()).blue(),
        style(layout.file_size).magenta()
    );
    println!("      {:<10} {:>12} .. {:<12}", "launcher", 0, launcher_end);
    for &id in layout.variant.slots() {
        match layout.get(id) {
            Some(section) => println!(
                "      {:<10} {:>12} .. {:<12} {}",
                id.name(),
                section.offset,
                section.end(),
                style(format!("{} bytes", section.size)).dim()
            ),
            None => println!("      {:<10} {}", id.name(), style("absent").dim()),
        }
    }
    println!(
        "      {:<10} {:>12} .. {:<12}",
        "trailer", layout.trailer_offset, layout.file_size
    );
}

#[allow(clippy::too_many_arguments)]
fn pack(
    binary: &Path, output: &Path, assets: Option<&Path>, prebuilt: Option<&Path>, aarch64: Option<&Path>,
    library: Option<&Path>, config: Option<&Path>, obfuscate: bool, helper: bool, runner: &str,
    launcher: Option<&Path>,
) -> PackResult<()> {
    let binary = get_input_file(binary)?;
    let assets = assets.map(get_input_dir).transpose()?;
    let prebuilt = prebuilt.map(get_input_file).transpose()?;
    let aarch64 = aarch64.map(get_input_file).transpose()?;
    let library = library.map(get_input_file).transpose()?;
    let config = get_config(config)?;
    let output = get_output(output)?;
    let total = if assets.is_some() || prebuilt.is_some() { 4 } else { 3 };

    let (launcher_name, launcher) = get_launcher(runner, launcher)?;
    step(1, total, "🔍 ", format!("using launcher {}…", style(&launcher_name).blue()));
    let mut payloads = Payloads::new(read(&binary)?);
    payloads.secondary = aarch64.as_deref().map(read).transpose()?;
    payloads.library = library.as_deref().map(read).transpose()?;

    let mut current = 2;
    if let Some(source) = &assets {
        step(current, total, "🚚 ", format!("bundling {}…", style(display_path(source)).blue()));
        current += 1;
        payloads.assets = Some(build_bundle(source, config, obfuscate, helper, &get_stem(&binary)?)?);
    } else if let Some(source) = &prebuilt {
        step(current, total, "🚚 ", format!("checking bundle {}…", style(display_path(source)).blue()));
        current += 1;
        payloads.assets = Some(get_bundle_file(source)?);
    }

    step(current, total, "📃 ", format!("writing {}…", style(display_path(&output)).blue()));
    current += 1;
    let layout = container::write_executable(&launcher, &payloads, &output)?;

    step(current, total, "📦 ", "container structure:");
    print_layout(&layout);
    done();
    Ok(())
}

fn bundle(input: &Path, output: &Path, config: Option<&Path>, obfuscate: bool, helper: bool) -> PackResult<()> {
    let source = get_input(input)?;
    let config = get_config(config)?;
    let output = get_output(output)?;

    step(1, 2, "🚚 ", format!("bundling {}…", style(display_path(&source)).blue()));
    let fallback_id = get_stem(&source)?;
    let bundle = build_bundle(&source, config, obfuscate, helper, &fallback_id)?;

    step(2, 2, "📃 ", format!("writing {}…", style(display_path(&output)).blue()));
    write_output(&output, &bundle)?;
    done();
    Ok(())
}

fn unbundle(input: &Path, output: &Path) -> PackResult<()> {
    let source = get_input_file(input)?;
    step(1, 2, "🔍 ", format!("reading {}…", style(display_path(&source)).blue()));
    let bundle = AssetBundle::open(&source)?;
    println!(
        "      {} entries{}",
        style(bundle.len()).magenta(),
        if bundle.is_obfuscated() { ", obfuscated" } else { "" }
    );

    let target = std::env::current_dir()?.join(output);
    step(2, 2, "📃 ", format!("extracting to {}…", style(display_path(&target)).blue()));
    bundle.extract_to(&target)?;
    done();
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn deb(
    binary: &Path, name: Option<String>, version: Option<String>, architecture: String,
    maintainer: Option<String>, description: Option<String>, section: String, priority: String,
    assets: Option<&Path>, library: Option<&Path>, icon: Option<&Path>, config: Option<&Path>,
    output: Option<&Path>,
) -> PackResult<()> {
    let binary = get_input_file(binary)?;
    let config = get_config(config)?;
    let name = match name {
        Some(name) => name,
        None => get_stem(&binary)?,
    };
    let version = version
        .or_else(|| config.as_ref().map(|config| config.app.version.clone()))
        .unwrap_or_else(|| "1.0.0".to_string());

    let mut control = ControlFields::new(&name, &version);
    control.architecture = architecture;
    control.section = section;
    control.priority = priority;
    if let Some(maintainer) = maintainer {
        control.maintainer = maintainer;
    }
    if let Some(description) = description {
        control.description = description;
    }

    let files = ApplicationFiles {
        binary,
        assets: assets.map(get_input_file).transpose()?,
        library: library.map(get_input_file).transpose()?,
        icon: icon.map(get_input_file).transpose()?,
    };

    step(1, 2, "🔍 ", format!("collecting files for {}…", style(&name).blue()));
    let package = application_package(control, &files)?;
    for file in package.files() {
        println!("      {:o} {}", file.mode, file.path);
    }
    println!("      Installed-Size: {} KiB", style(package.installed_size()).magenta());

    let output = match output {
        Some(output) if output.is_dir() => output.join(package.file_name()),
        Some(output) => output.to_path_buf(),
        None => PathBuf::from(package.file_name()),
    };
    let output = get_output(&output)?;
    step(2, 2, "📃 ", format!("writing {}…", style(display_path(&output)).blue()));
    write_output(&output, &package.build()?)?;
    done();
    Ok(())
}

fn inspect(input: &Path) -> PackResult<()> {
    let source = get_input_file(input)?;
    let data = read(&source)?;
    let layout = ContainerLayout::read(&data)?;
    println!("{}:", style(display_path(&source)).blue());
    print_layout(&layout);
    if let Some(bundle) = layout.slice(&data, SectionId::Assets) {
        let bundle = AssetBundle::read(bundle)?;
        println!(
            "      assets: {} entries{}",
            style(bundle.len()).magenta(),
            if bundle.is_obfuscated() { ", obfuscated" } else { "" }
        );
    }
    Ok(())
}

fn dispatch(command: Commands) -> PackResult<()> {
    match command {
        Commands::Pack {
            binary,
            output,
            assets,
            bundle,
            aarch64,
            library,
            config,
            obfuscate,
            no_helper,
            runner,
            launcher,
        } => pack(
            &binary,
            &output,
            assets.as_deref(),
            bundle.as_deref(),
            aarch64.as_deref(),
            library.as_deref(),
            config.as_deref(),
            obfuscate,
            !no_helper,
            &runner,
            launcher.as_deref(),
        ),
        Commands::Bundle {
            input,
            output,
            config,
            obfuscate,
            no_helper,
        } => bundle(&input, &output, config.as_deref(), obfuscate, !no_helper),
        Commands::Unbundle { input, output } => unbundle(&input, &output),
        Commands::Deb {
            binary,
            name,
            version,
            architecture,
            maintainer,
            description,
            section,
            priority,
            assets,
            library,
            icon,
            config,
            output,
        } => deb(
            &binary,
            name,
            version,
            architecture,
            maintainer,
            description,
            section,
            priority,
            assets.as_deref(),
            library.as_deref(),
            icon.as_deref(),
            config.as_deref(),
            output.as_deref(),
        ),
        Commands::Inspect { input } => inspect(&input),
        Commands::Runners => {
            list_runners();
            Ok(())
        }
    }
}

fn main() {
    color_backtrace::install();

    let args = Args::parse();
    if let Err(e) = dispatch(args.command) {
        eprintln!("{}: {}", style("error").red().bold(), e);
        std::process::exit(1);
    }
}
