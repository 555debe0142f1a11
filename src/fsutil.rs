use crate::error::{Error, Result};
use dirs::data_local_dir;
use std::path::{Path, PathBuf};

pub fn default_cache_root() -> PathBuf {
    let mut root = data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    root.push("hoistpm");
    root.push("cache");
    root
}

/// Flat file stem for a package name; scoped names keep their scope in one segment.
pub fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}

/// `base/<part>/<part>` for a possibly scoped package name. Names with
/// empty, `.` or `..` parts are refused.
pub fn package_dir(base: &Path, name: &str) -> Result<PathBuf> {
    let mut p = base.to_path_buf();
    for part in name.split('/') {
        if matches!(part, "" | "." | "..") || part.contains('\\') {
            return Err(Error::InvalidPackageName(name.to_string()));
        }
        p.push(part);
    }
    Ok(p)
}
