use super::common::{id, manifest_json, tarball};
use crate::error::Error;
use crate::fsutil::package_dir;
use crate::installer::{extract, list_entries, place_tree};
use crate::resolver::PackageId;
use crate::tree::InstallTree;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

fn write_archive(dir: &Path, file: &str, entries: &[(&str, &str)]) -> PathBuf {
    let path = dir.join(file);
    fs::write(&path, tarball(entries)).unwrap();
    path
}

/// Archive with a symlink entry `link -> target` followed by regular `files`.
fn write_linked_archive(dir: &Path, kind: tar::EntryType, link: &str, target: &str, files: &[(&str, &str)]) -> PathBuf {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(kind);
    header.set_size(0);
    header.set_mode(0o777);
    builder.append_link(&mut header, link, target).unwrap();
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, path, contents.as_bytes()).unwrap();
    }
    let bytes = builder.into_inner().unwrap().finish().unwrap();
    let path = dir.join("linked.tgz");
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn lists_raw_entry_paths() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "a.tgz", &[("package/z.js", ""), ("package/a.js", "")]);
    assert_eq!(list_entries(&archive).unwrap(), ["package/a.js", "package/z.js"]);
}

#[test]
fn strips_the_wrapper_directory() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(
        dir.path(),
        "a.tgz",
        &[("package/package.json", "{}"), ("package/lib/index.js", "module.exports = 1;")],
    );
    let target = dir.path().join("out");

    extract(&archive, &target).unwrap();
    assert_eq!(fs::read_to_string(target.join("package.json")).unwrap(), "{}");
    assert_eq!(fs::read_to_string(target.join("lib").join("index.js")).unwrap(), "module.exports = 1;");
    assert!(!target.join("package").exists());
}

#[test]
fn wrapper_name_does_not_matter() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "n.tgz", &[("node/index.js", "x")]);
    let target = dir.path().join("out");
    extract(&archive, &target).unwrap();
    assert!(target.join("index.js").is_file());
}

#[test]
fn loose_top_level_file_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "evil.tgz", &[("package/index.js", "ok"), ("evil.txt", "boom")]);
    let target = dir.path().join("out");

    match extract(&archive, &target) {
        Err(Error::UnsafeArchive { entry, .. }) => assert_eq!(entry, "evil.txt"),
        other => panic!("expected unsafe archive error, got {other:?}"),
    }
    assert!(!target.exists());
}

#[test]
fn parent_components_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "up.tgz", &[("package/../../escape.js", "boom")]);
    let target = dir.path().join("out");
    assert!(matches!(extract(&archive, &target), Err(Error::UnsafeArchive { .. })));
    assert!(!dir.path().join("escape.js").exists());
}

#[test]
fn existing_target_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_archive(dir.path(), "a.tgz", &[("package/new.js", "")]);
    let target = dir.path().join("out");
    fs::create_dir_all(&target).unwrap();
    fs::write(target.join("stale.js"), "").unwrap();

    extract(&archive, &target).unwrap();
    assert!(target.join("new.js").exists());
    assert!(!target.join("stale.js").exists());
}

#[test]
fn places_nested_and_scoped_packages() {
    let dir = tempfile::tempdir().unwrap();
    let mut archives: BTreeMap<PackageId, PathBuf> = BTreeMap::new();
    for raw in ["a@1.0.0", "b@2.0.0", "@s/p@1.0.0"] {
        let pid = id(raw);
        let file = format!("{}.tgz", raw.replace(['/', '@'], "_"));
        let json = manifest_json(&pid.name, &pid.version);
        archives.insert(pid, write_archive(dir.path(), &file, &[("package/package.json", &json)]));
    }
    let tree = InstallTree::from_chains(&[
        vec![id("a@1.0.0")],
        vec![id("a@1.0.0"), id("b@2.0.0")],
        vec![id("@s/p@1.0.0")],
    ]);
    let project = dir.path().join("project");

    let placed = place_tree(&tree, &archives, &project, "node_modules").unwrap();
    assert_eq!(placed, 3);

    let read = |p: PathBuf| fs::read_to_string(p.join("package.json")).unwrap();
    let modules = project.join("node_modules");
    assert!(read(modules.join("a")).contains(r#""version":"1.0.0""#));
    assert!(read(modules.join("a").join("node_modules").join("b")).contains(r#""name":"b""#));
    assert!(read(modules.join("@s").join("p")).contains(r#""name":"@s/p""#));
    assert!(!modules.join("b").exists());
}

#[test]
fn placing_without_an_archive_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tree = InstallTree::from_chains(&[vec![id("a@1.0.0")]]);
    let err = place_tree(&tree, &BTreeMap::new(), dir.path(), "node_modules").unwrap_err();
    assert!(matches!(err, Error::MissingRecord(ref s) if s == "a@1.0.0"));
}

#[test]
fn symlink_out_of_the_package_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("sibling")).unwrap();
    let archive = write_linked_archive(
        dir.path(),
        tar::EntryType::Symlink,
        "package/link",
        "../sibling",
        &[("package/link/escaped.txt", "boom")],
    );
    let target = dir.path().join("out");

    match extract(&archive, &target) {
        Err(Error::UnsafeArchive { entry, .. }) => assert_eq!(entry, "package/link"),
        other => panic!("expected unsafe archive error, got {other:?}"),
    }
    assert!(!target.exists());
    assert!(!dir.path().join("sibling").join("escaped.txt").exists());
}

#[test]
fn absolute_symlink_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_linked_archive(dir.path(), tar::EntryType::Symlink, "package/etc", "/etc", &[]);
    assert!(matches!(extract(&archive, &dir.path().join("out")), Err(Error::UnsafeArchive { .. })));
}

#[test]
fn hard_links_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_linked_archive(
        dir.path(),
        tar::EntryType::Link,
        "package/copy.js",
        "package/index.js",
        &[("package/index.js", "x")],
    );
    assert!(matches!(extract(&archive, &dir.path().join("out")), Err(Error::UnsafeArchive { .. })));
}

#[cfg(unix)]
#[test]
fn symlink_inside_the_package_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let archive = write_linked_archive(
        dir.path(),
        tar::EntryType::Symlink,
        "package/main.js",
        "lib/index.js",
        &[("package/lib/index.js", "module.exports = 1;")],
    );
    let target = dir.path().join("out");

    extract(&archive, &target).unwrap();
    assert_eq!(fs::read_link(target.join("main.js")).unwrap(), PathBuf::from("lib/index.js"));
    assert_eq!(fs::read_to_string(target.join("main.js")).unwrap(), "module.exports = 1;");
}

#[test]
fn dot_dot_package_names_are_not_placed() {
    let dir = tempfile::tempdir().unwrap();
    let victim = dir.path().join("victim");
    fs::create_dir_all(&victim).unwrap();
    fs::write(victim.join("keep.txt"), "keep").unwrap();

    let pid = id("a/../../victim@1.0.0");
    let archive = write_archive(dir.path(), "v.tgz", &[("package/package.json", "{}")]);
    let archives = BTreeMap::from([(pid.clone(), archive)]);
    let tree = InstallTree::from_chains(&[vec![pid]]);

    let err = place_tree(&tree, &archives, &dir.path().join("project"), "node_modules").unwrap_err();
    assert!(matches!(err, Error::InvalidPackageName(ref n) if n == "a/../../victim"));
    assert!(victim.join("keep.txt").exists());
}

#[test]
fn package_dirs_stay_under_the_base() {
    let base = Path::new("/p/node_modules");
    assert_eq!(package_dir(base, "a").unwrap(), base.join("a"));
    assert_eq!(package_dir(base, "@s/p").unwrap(), base.join("@s").join("p"));
    for bad in ["..", "a/..", "a/../../victim", "@s/", "./a", "", "a//b"] {
        assert!(matches!(package_dir(base, bad), Err(Error::InvalidPackageName(_))), "{bad}");
    }
}
