use crate::error::{Error, Result};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tar::Archive;

fn open(archive: &Path) -> Result<Archive<GzDecoder<File>>> {
    Ok(Archive::new(GzDecoder::new(File::open(archive)?)))
}

/// Raw entry paths of a gzipped tarball, sorted.
pub fn list_entries(archive: &Path) -> Result<Vec<String>> {
    let failed = |e: io::Error| Error::Extraction {
        file: archive.to_path_buf(),
        target: PathBuf::new(),
        reason: e.to_string(),
    };
    let mut ar = open(archive)?;
    let mut out = Vec::new();
    for entry in ar.entries().map_err(failed)? {
        let entry = entry.map_err(failed)?;
        out.push(String::from_utf8_lossy(&entry.path_bytes()).into_owned());
    }
    out.sort();
    Ok(out)
}

fn escapes(path: &Path) -> bool {
    path.components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
}

/// Refuse loose top-level entries, paths leaving the wrapper, hard links and
/// symlinks pointing outside the package.
fn check_entries(archive: &Path) -> Result<()> {
    let failed = |e: io::Error| Error::Extraction {
        file: archive.to_path_buf(),
        target: PathBuf::new(),
        reason: e.to_string(),
    };
    let unsafe_entry = |entry: String| Error::UnsafeArchive { file: archive.to_path_buf(), entry };
    let mut ar = open(archive)?;
    for entry in ar.entries().map_err(failed)? {
        let entry = entry.map_err(failed)?;
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
        if !raw.contains('/') || escapes(Path::new(&raw)) {
            return Err(unsafe_entry(raw));
        }
        let kind = entry.header().entry_type();
        if kind.is_hard_link() {
            return Err(unsafe_entry(raw));
        }
        if kind.is_symlink() {
            let link = entry.link_name_bytes().map(|l| String::from_utf8_lossy(&l).into_owned());
            match link {
                Some(link) if !link.is_empty() && !escapes(Path::new(&link)) => {}
                _ => return Err(unsafe_entry(raw)),
            }
        }
    }
    Ok(())
}

/// Unpack `archive` into `target` with the single top-level wrapper directory
/// stripped. Unsafe archives are refused before `target` is touched.
pub fn extract(archive: &Path, target: &Path) -> Result<()> {
    check_entries(archive)?;

    let failed = |e: io::Error| Error::Extraction {
        file: archive.to_path_buf(),
        target: target.to_path_buf(),
        reason: e.to_string(),
    };
    if target.exists() {
        fs::remove_dir_all(target).map_err(failed)?;
    }
    fs::create_dir_all(target).map_err(failed)?;

    let mut ar = open(archive)?;
    ar.set_preserve_permissions(true);
    for entry in ar.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        let stripped: PathBuf = path.components().skip(1).collect();
        if stripped.as_os_str().is_empty() {
            continue;
        }
        let dest = target.join(&stripped);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(failed)?;
        }
        entry.unpack(&dest).map_err(failed)?;
    }
    Ok(())
}
