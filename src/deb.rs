//! Debian package assembly without any packaging toolchain.
//!
//! A `.deb` is an `ar` archive with exactly three members, in this order:
//! - `debian-binary`: the text `2.0\n`
//! - `control.tar.gz`: the `control` metadata file
//! - `data.tar.gz`: the files to install, at their absolute install paths

use std::path::{Path, PathBuf};

use crate::{
    ar::{self, ArMember},
    bundle::ASSETS_FILE,
    entry::{unix_now, ArchiveEntry, DEFAULT_FILE_MODE, EXECUTABLE_MODE},
    error::{PackError, PackResult},
    gzip, tar,
};

pub const DEBIAN_BINARY: &[u8] = b"2.0\n";
pub const BIN_DIR: &str = "/usr/local/bin";
pub const APPLICATIONS_DIR: &str = "/usr/share/applications";
pub const PIXMAPS_DIR: &str = "/usr/share/pixmaps";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFields {
    pub package:      String,
    pub version:      String,
    pub architecture: String,
    pub maintainer:   String,
    pub section:      String,
    pub priority:     String,
    pub description:  String,
}

impl ControlFields {
    pub fn new(package: &str, version: &str) -> Self {
        ControlFields {
            package:      package.to_string(),
            version:      version.to_string(),
            architecture: "amd64".to_string(),
            maintainer:   format!("{} maintainers <noreply@localhost>", package),
            section:      "games".to_string(),
            priority:     "optional".to_string(),
            description:  package.to_string(),
        }
    }

    fn validate(&self) -> PackResult<()> {
        let fields = [
            ("Package", &self.package),
            ("Version", &self.version),
            ("Architecture", &self.architecture),
            ("Maintainer", &self.maintainer),
            ("Section", &self.section),
            ("Priority", &self.priority),
            ("Description", &self.description),
        ];
        for (key, value) in fields {
            if value.trim().is_empty() || value.contains('\n') {
                return Err(PackError::InvalidName(format!(
                    "control field {} must be a single non-empty line",
                    key
                )));
            }
        }
        Ok(())
    }

    /// The `control` file: one `Key: Value` line per field and a trailing blank line.
    pub fn render(&self, installed_size_kib: u64) -> String {
        [
            format!("Package: {}", self.package),
            format!("Version: {}", self.version),
            format!("Architecture: {}", self.architecture),
            format!("Maintainer: {}", self.maintainer),
            format!("Installed-Size: {}", installed_size_kib),
            format!("Section: {}", self.section),
            format!("Priority: {}", self.priority),
            format!("Description: {}", self.description),
            String::new(),
        ]
        .join("\n")
    }
}

/// A freedesktop `.desktop` launcher entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name:       String,
    pub exec:       String,
    pub icon:       String,
    pub categories: String,
}

impl DesktopEntry {
    pub fn for_binary(name: &str) -> Self {
        DesktopEntry {
            name:       name.to_string(),
            exec:       format!("{}/{}", BIN_DIR, name),
            icon:       name.to_string(),
            categories: "Game;".to_string(),
        }
    }

    pub fn render(&self) -> String {
        [
            "[Desktop Entry]".to_string(),
            "Type=Application".to_string(),
            format!("Name={}", self.name),
            format!("Exec={}", self.exec),
            format!("Icon={}", self.icon),
            format!("Categories={}", self.categories),
            "Terminal=false".to_string(),
            "StartupNotify=true".to_string(),
            String::new(),
        ]
        .join("\n")
    }
}

#[derive(Debug, Clone)]
pub struct DebPackage {
    control: ControlFields,
    files:   Vec<ArchiveEntry>,
}

impl DebPackage {
    pub fn new(control: ControlFields) -> Self {
        DebPackage {
            control,
            files: Vec::new(),
        }
    }

    pub fn control(&self) -> &ControlFields { &self.control }

    pub fn files(&self) -> &[ArchiveEntry] { &self.files }

    /// Install the file at `source` to the absolute path `destination`.
    pub fn install_file(&mut self, source: &Path, destination: &str, mode: u32) -> PackResult<()> {
        let entry = ArchiveEntry::from_file(source, &data_path(destination)?, Some(mode))?;
        self.files.push(entry);
        Ok(())
    }

    /// Install generated contents to the absolute path `destination`.
    pub fn install_data(&mut self, destination: &str, mode: u32, data: Vec<u8>) -> PackResult<()> {
        let entry = ArchiveEntry::new(&data_path(destination)?, mode, unix_now(), data)?;
        self.files.push(entry);
        Ok(())
    }

    /// Register a desktop entry under `/usr/share/applications/<name>.desktop`.
    pub fn install_desktop_entry(&mut self, entry: &DesktopEntry) -> PackResult<()> {
        self.install_data(
            &format!("{}/{}.desktop", APPLICATIONS_DIR, entry.name),
            DEFAULT_FILE_MODE,
            entry.render().into_bytes(),
        )
    }

    /// Sum of all installed file sizes in KiB, rounded up.
    pub fn installed_size(&self) -> u64 { self.files.iter().map(ArchiveEntry::len).sum::<u64>().div_ceil(1024) }

    pub fn control_file(&self) -> String { self.control.render(self.installed_size()) }

    pub fn build(&self) -> PackResult<Vec<u8>> {
        self.control.validate()?;

        let control = ArchiveEntry::new(
            "./control",
            DEFAULT_FILE_MODE,
            unix_now(),
            self.control_file().into_bytes(),
        )?;
        let control = gzip::compress(&tar::build(&[control])?)?;
        let data = gzip::compress(&tar::build(&self.files)?)?;

        ar::build(&[
            ArMember::new("debian-binary", DEBIAN_BINARY.to_vec()),
            ArMember::new("control.tar.gz", control),
            ArMember::new("data.tar.gz", data),
        ])
    }

    /// Default file name: `<package>_<version>_<architecture>.deb`.
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}_{}.deb",
            self.control.package, self.control.version, self.control.architecture
        )
    }
}

/// Map an absolute install path to its name inside `data.tar.gz`.
pub fn data_path(destination: &str) -> PackResult<String> {
    let destination = destination.replace('\\', "/");
    let relative = destination
        .trim_start_matches("./")
        .trim_start_matches('/');
    if relative.is_empty() || relative.split('/').any(|part| part == "..") {
        return Err(PackError::InvalidName(format!(
            "install path {:?} is not a file path",
            destination
        )));
    }
    Ok(format!("./{}", relative))
}

/// Inputs of a packaged desktop application.
#[derive(Debug, Clone)]
pub struct ApplicationFiles {
    pub binary:  PathBuf,
    pub assets:  Option<PathBuf>,
    pub library: Option<PathBuf>,
    pub icon:    Option<PathBuf>,
}

/// Build the standard package layout for an application: the binary, its optional asset
/// bundle and platform library under `/usr/local/bin`, an optional icon and a desktop entry.
pub fn application_package(
    control: ControlFields, files: &ApplicationFiles,
) -> PackResult<DebPackage> {
    let name = control.package.clone();
    let mut package = DebPackage::new(control);

    package.install_file(&files.binary, &format!("{}/{}", BIN_DIR, name), EXECUTABLE_MODE)?;
    if let Some(assets) = &files.assets {
        package.install_file(assets, &format!("{}/{}", BIN_DIR, ASSETS_FILE), DEFAULT_FILE_MODE)?;
    }
    if let Some(library) = &files.library {
        let file_name = library
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| PackError::InvalidName(library.display().to_string()))?;
        package.install_file(library, &format!("{}/{}", BIN_DIR, file_name), EXECUTABLE_MODE)?;
    }
    if let Some(icon) = &files.icon {
        package.install_file(icon, &format!("{}/{}.png", PIXMAPS_DIR, name), DEFAULT_FILE_MODE)?;
    }
    package.install_desktop_entry(&DesktopEntry::for_binary(&name))?;
    Ok(package)
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn read_tar_gz(data: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
        let mut archive = ::tar::Archive::new(GzDecoder::new(data));
        archive
            .entries()
            .unwrap()
            .map(|file| {
                let mut file = file.unwrap();
                let path = file.path().unwrap().to_string_lossy().into_owned();
                let mode = file.header().mode().unwrap();
                let mut contents = Vec::new();
                file.read_to_end(&mut contents).unwrap();
                (path, mode, contents)
            })
            .collect()
    }

    #[test]
    fn control_file_has_mandatory_keys_and_blank_line() {
        let control = ControlFields::new("demo", "1.0").render(3);
        for key in [
            "Package: demo",
            "Version: 1.0",
            "Architecture: amd64",
            "Maintainer: ",
            "Installed-Size: 3",
            "Section: games",
            "Priority: optional",
            "Description: demo",
        ] {
            assert!(control.contains(key), "missing {key}");
        }
        assert!(control.ends_with("demo\n"));
        assert_eq!(control.lines().count(), 8);
    }

    #[test]
    fn installed_size_rounds_up_to_kib() {
        let mut package = DebPackage::new(ControlFields::new("demo", "1.0"));
        package.install_data("/usr/local/bin/demo", 0o755, vec![0; 1025]).unwrap();
        assert_eq!(package.installed_size(), 2);
        package.install_data("/usr/local/bin/other", 0o644, vec![0; 1023]).unwrap();
        assert_eq!(package.installed_size(), 2);
        package.install_data("/usr/local/bin/third", 0o644, vec![0; 1]).unwrap();
        assert_eq!(package.installed_size(), 3);
    }

    #[test]
    fn data_paths_are_dot_relative() {
        assert_eq!(data_path("/usr/local/bin/demo").unwrap(), "./usr/local/bin/demo");
        assert_eq!(data_path("./usr/share/x").unwrap(), "./usr/share/x");
        assert!(data_path("/").is_err());
        assert!(data_path("/usr/../etc/passwd").is_err());
    }

    #[test]
    fn package_has_three_members_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let binary = dir.path().join("demo");
        std::fs::write(&binary, vec![0x7f; 3000]).unwrap();

        let mut control = ControlFields::new("demo", "1.0");
        control.architecture = "amd64".into();
        let package = application_package(control, &ApplicationFiles {
            binary:  binary.clone(),
            assets:  None,
            library: None,
            icon:    None,
        })
        .unwrap();
        assert_eq!(package.file_name(), "demo_1.0_amd64.deb");

        let deb = package.build().unwrap();
        let members = ar::parse(&deb).unwrap();
        let names = members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["debian-binary", "control.tar.gz", "data.tar.gz"]);
        assert_eq!(members[0].data, b"2.0\n");

        let control = read_tar_gz(&members[1].data);
        assert_eq!(control.len(), 1);
        assert_eq!(control[0].0, "./control");
        let text = String::from_utf8(control[0].2.clone()).unwrap();
        assert!(text.contains("Package: demo\n"));
        assert!(text.contains("Installed-Size: 4\n"));

        let data = read_tar_gz(&members[2].data);
        assert_eq!(data[0].0, "./usr/local/bin/demo");
        assert_eq!(data[0].1, 0o755);
        assert_eq!(data[0].2.len(), 3000);
        assert_eq!(data[1].0, "./usr/share/applications/demo.desktop");
        let desktop = String::from_utf8(data[1].2.clone()).unwrap();
        assert!(desktop.contains("Exec=/usr/local/bin/demo\n"));
    }

    #[test]
    fn optional_files_get_their_install_paths() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str| {
            let path = dir.path().join(name);
            std::fs::write(&path, name.as_bytes()).unwrap();
            path
        };
        let files = ApplicationFiles {
            binary:  write("game"),
            assets:  Some(write("bundle")),
            library: Some(write("libplatform.so")),
            icon:    Some(write("icon.png")),
        };
        let package = application_package(ControlFields::new("game", "2.1"), &files).unwrap();
        let paths = package
            .files()
            .iter()
            .map(|entry| (entry.path.as_str(), entry.mode))
            .collect::<Vec<_>>();
        assert_eq!(paths, [
            ("./usr/local/bin/game", 0o755),
            ("./usr/local/bin/app-assets", 0o644),
            ("./usr/local/bin/libplatform.so", 0o755),
            ("./usr/share/pixmaps/game.png", 0o644),
            ("./usr/share/applications/game.desktop", 0o644),
        ]);
    }

    #[test]
    fn missing_binary_fails_before_output() {
        let dir = tempfile::tempdir().unwrap();
        let result = application_package(ControlFields::new("demo", "1.0"), &ApplicationFiles {
            binary:  dir.path().join("absent"),
            assets:  None,
            library: None,
            icon:    None,
        });
        assert!(matches!(result, Err(PackError::MissingInput { .. })));
    }

    #[test]
    fn multiline_control_values_are_rejected() {
        let mut control = ControlFields::new("demo", "1.0");
        control.description = "first\nsecond".into();
        assert!(DebPackage::new(control).build().is_err());
    }
}
