use std::{fs, io::Read, path::Path};

use apppack::{
    ar,
    bundle::{AssetBundle, BundleBuilder, ObfuscationKey, CONFIG_ENTRY, HELPER_ENTRY},
    config::AppConfig,
    container::{self, ContainerLayout, Payloads, SectionId, SectionTable, Variant},
    deb::{application_package, ApplicationFiles, ControlFields},
    output::write_output,
    PackError,
};
use flate2::read::GzDecoder;

fn asset_tree(root: &Path) {
    fs::create_dir_all(root.join("js")).unwrap();
    fs::create_dir_all(root.join("img")).unwrap();
    fs::write(root.join("index.html"), b"<!doctype html><script src=js/main.js></script>").unwrap();
    fs::write(root.join("js/main.js"), b"console.log('hello')").unwrap();
    fs::write(root.join("img/logo.png"), [0x89, b'P', b'N', b'G', 0, 1, 2, 3]).unwrap();
}

fn tar_entries(data: &[u8]) -> Vec<(String, u32, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(data));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            let mode = entry.header().mode().unwrap();
            let mut contents = Vec::new();
            entry.read_to_end(&mut contents).unwrap();
            (path, mode, contents)
        })
        .collect()
}

#[test]
fn packed_container_round_trips_through_inspection() {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("dist");
    asset_tree(&assets);

    let mut config = AppConfig::default();
    config.app.identifier = Some("dev.example.hello".into());
    config.window.title = "Hello".into();

    let mut builder = BundleBuilder::new();
    builder.add_dir(&assets, || {}, |_| {}, |_| {}).unwrap();
    builder
        .config(config.clone())
        .obfuscate(ObfuscationKey::derive(config.project_id()));
    let bundle = builder.build(|_| {}).unwrap();

    let launcher = b"\x7fELF fake launcher".to_vec();
    let primary = vec![0xAB; 1001];
    let library = vec![0xCD; 77];
    let mut table = SectionTable::new(Variant::Standard);
    table.set(SectionId::Primary, &primary).unwrap();
    table.set(SectionId::Assets, &bundle).unwrap();
    table.set(SectionId::Library, &library).unwrap();

    let output = dir.path().join("hello");
    let mut packed = Vec::new();
    let layout = container::pack(&launcher, &table, &mut packed).unwrap();
    write_output(&output, &packed).unwrap();

    let packed = fs::read(&output).unwrap();
    assert!(packed.starts_with(&launcher));
    let read = ContainerLayout::read(&packed).unwrap();
    assert_eq!(read, layout);
    assert_eq!(read.slice(&packed, SectionId::Primary), Some(primary.as_slice()));
    assert_eq!(read.slice(&packed, SectionId::Library), Some(library.as_slice()));

    let bundle = AssetBundle::read(read.slice(&packed, SectionId::Assets).unwrap()).unwrap();
    assert!(bundle.is_obfuscated());
    assert_eq!(bundle.get("js/main.js"), Some(&b"console.log('hello')"[..]));
    assert!(bundle.get(HELPER_ENTRY).is_some());
    assert!(bundle.get(CONFIG_ENTRY).is_some());
    assert_eq!(bundle.config().unwrap(), Some(config));
}

#[test]
fn universal_container_keeps_both_payloads() {
    let x86 = vec![1u8; 40];
    let arm = vec![2u8; 41];
    let mut table = SectionTable::new(Variant::Universal);
    table.set(SectionId::Primary, &x86).unwrap();
    table.set(SectionId::Secondary, &arm).unwrap();
    let mut packed = Vec::new();
    container::pack(b"launcher", &table, &mut packed).unwrap();

    let layout = ContainerLayout::read(&packed).unwrap();
    assert_eq!(layout.variant, Variant::Universal);
    assert_eq!(layout.slice(&packed, SectionId::Secondary), Some(arm.as_slice()));
    assert!(layout.get(SectionId::Assets).is_none());
}

#[test]
fn packed_file_is_an_executable_container() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("hello");
    let launcher = b"\x7fELF fake launcher";
    let mut payloads = Payloads::new(vec![0xAB; 513]);
    payloads.assets = Some(BundleBuilder::new().without_helper().build(|_| {}).unwrap());
    payloads.library = Some(vec![0xCD; 9]);

    let layout = container::write_executable(launcher, &payloads, &output).unwrap();
    let names = fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name())
        .collect::<Vec<_>>();
    assert_eq!(names, ["hello"]);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&output).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    let packed = fs::read(&output).unwrap();
    assert_eq!(packed.len() as u64, layout.file_size);
    let read = ContainerLayout::read(&packed).unwrap();
    assert_eq!(read, layout);
    assert_eq!(read.variant, Variant::Standard);
    assert_eq!(read.slice(&packed, SectionId::Primary), Some(payloads.primary.as_slice()));
    assert_eq!(read.slice(&packed, SectionId::Assets), payloads.assets.as_deref());
    assert_eq!(read.slice(&packed, SectionId::Library), payloads.library.as_deref());
    assert!(AssetBundle::read(read.slice(&packed, SectionId::Assets).unwrap()).unwrap().is_empty());
}

#[test]
fn corrupted_container_is_rejected() {
    let mut table = SectionTable::new(Variant::Standard);
    table.set(SectionId::Primary, b"payload").unwrap();
    let mut packed = Vec::new();
    container::pack(b"launcher", &table, &mut packed).unwrap();
    let last = packed.len() - Variant::Standard.trailer_size();
    packed[last + 5] ^= 0xFF;
    assert!(matches!(ContainerLayout::read(&packed), Err(PackError::InvalidMagic(_))));
}

#[test]
fn debian_package_opens_with_standard_readers() {
    let dir = tempfile::tempdir().unwrap();
    let binary = dir.path().join("hello");
    let assets = dir.path().join("app-assets");
    let icon = dir.path().join("icon.png");
    fs::write(&binary, vec![0x7f; 3000]).unwrap();
    fs::write(&assets, b"bundle").unwrap();
    fs::write(&icon, b"png").unwrap();

    let files = ApplicationFiles {
        binary,
        assets: Some(assets),
        library: None,
        icon: Some(icon),
    };
    let package = application_package(ControlFields::new("hello", "1.2.3"), &files).unwrap();
    assert_eq!(package.file_name(), "hello_1.2.3_amd64.deb");
    let deb = package.build().unwrap();

    let members = ar::parse(&deb).unwrap();
    let names = members.iter().map(|m| m.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, ["debian-binary", "control.tar.gz", "data.tar.gz"]);
    assert_eq!(members[0].data, b"2.0\n");

    let control = tar_entries(&members[1].data);
    assert_eq!(control.len(), 1);
    assert_eq!(control[0].0, "./control");
    let control = String::from_utf8(control[0].2.clone()).unwrap();
    assert!(control.contains("Package: hello\n"));
    assert!(control.contains("Installed-Size: 4\n"));

    let data = tar_entries(&members[2].data);
    let paths = data.iter().map(|(path, mode, _)| (path.as_str(), *mode)).collect::<Vec<_>>();
    assert_eq!(paths, [
        ("./usr/local/bin/hello", 0o755),
        ("./usr/local/bin/app-assets", 0o644),
        ("./usr/share/pixmaps/hello.png", 0o644),
        ("./usr/share/applications/hello.desktop", 0o644),
    ]);
    let desktop = String::from_utf8(data[3].2.clone()).unwrap();
    assert!(desktop.starts_with("[Desktop Entry]\n"));
    assert!(desktop.contains("Exec=/usr/local/bin/hello\n"));
}

#[test]
fn missing_input_fails_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let files = ApplicationFiles {
        binary:  dir.path().join("missing"),
        assets:  None,
        library: None,
        icon:    None,
    };
    let result = application_package(ControlFields::new("hello", "1.0.0"), &files);
    assert!(matches!(result, Err(PackError::MissingInput { .. })));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}
