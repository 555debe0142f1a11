//! Archive cache: `<cache>/packages/<file>.tgz`, filled by streaming into a
//! `.part` sibling that is only renamed into place once it verifies.

use crate::error::{Error, Result};
use crate::fetch::{RegistryClient, VersionRecord};
use crate::fsutil::package_dir;
use crate::resolver::PackageId;
use base64::{engine::general_purpose::STANDARD, Engine};
use flate2::read::GzDecoder;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use sha1::Sha1;
use sha2::{Digest, Sha512};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tar::Archive;
use tracing::{debug, warn};

/// Downloads per package before an integrity failure is final.
pub const MAX_ATTEMPTS: usize = 2;

pub struct ArchiveStore {
    root: PathBuf,
    client: Arc<dyn RegistryClient>,
    root_ready: OnceCell<()>,
}

impl ArchiveStore {
    pub fn new(root: impl Into<PathBuf>, client: Arc<dyn RegistryClient>) -> Self {
        Self { root: root.into(), client, root_ready: OnceCell::new() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Local path of a verified archive for `record`, downloading it when the
    /// cached copy is missing or does not verify.
    pub fn download(&self, record: &VersionRecord) -> Result<PathBuf> {
        let path = self.archive_path(record)?;
        self.root_ready.get_or_try_init(|| fs::create_dir_all(&self.root))?;
        if let Some(dir) = path.parent().filter(|d| *d != self.root) {
            fs::create_dir_all(dir)?;
        }

        if path.exists() {
            match verify_archive(&path, record) {
                Ok(()) => {
                    debug!(package = %record.id(), "archive cache hit");
                    return Ok(path);
                }
                Err(e) if e.is_integrity() => {
                    warn!(package = %record.id(), error = %e, "cached archive is invalid; refetching");
                }
                Err(e) => return Err(e),
            }
        }

        let mut attempt = 1;
        loop {
            match self.fetch_into(record, &path) {
                Ok(()) => return Ok(path),
                Err(e) if e.is_integrity() && attempt < MAX_ATTEMPTS => {
                    warn!(package = %record.id(), attempt, error = %e, "archive failed verification; retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// `<root>/<file>.tgz`, or `<root>/@scope/<file>.tgz` for scoped packages.
    pub fn archive_path(&self, record: &VersionRecord) -> Result<PathBuf> {
        let file_name = archive_file_name(&record.dist.tarball)?;
        match record.name.split_once('/') {
            Some((scope, _)) if scope.starts_with('@') => Ok(package_dir(&self.root, scope)?.join(file_name)),
            Some(_) => Err(Error::InvalidPackageName(record.name.clone())),
            None => Ok(self.root.join(file_name)),
        }
    }

    fn fetch_into(&self, record: &VersionRecord, path: &Path) -> Result<()> {
        let part = part_path(path);
        debug!(package = %record.id(), url = %record.dist.tarball, "downloading");
        let written = (|| -> Result<()> {
            let mut out = BufWriter::new(File::create(&part)?);
            self.client.fetch_tarball(&record.dist.tarball, &mut out)?;
            out.flush()?;
            drop(out);
            verify_archive(&part, record)
        })();
        match written {
            Ok(()) => {
                fs::rename(&part, path)?;
                Ok(())
            }
            Err(e) => {
                let _ = fs::remove_file(&part);
                // Name the final path so callers see which archive failed.
                Err(match e {
                    Error::HashMismatch { expected, actual, .. } => {
                        Error::HashMismatch { file: path.to_path_buf(), expected, actual }
                    }
                    Error::Verification { reason, .. } => Error::Verification { file: path.to_path_buf(), reason },
                    other => other,
                })
            }
        }
    }

    /// Download every record on a pool of `concurrency` workers.
    pub fn download_all<'a>(
        &self,
        records: impl IntoIterator<Item = &'a Arc<VersionRecord>>,
        concurrency: usize,
    ) -> Result<BTreeMap<PackageId, PathBuf>> {
        let records: Vec<&Arc<VersionRecord>> = records.into_iter().collect();
        // Two packages sharing one archive path would race on its `.part` file.
        let mut owners: BTreeMap<PathBuf, PackageId> = BTreeMap::new();
        for record in &records {
            let path = self.archive_path(record)?;
            if let Some(first) = owners.insert(path.clone(), record.id()).filter(|f| *f != record.id()) {
                return Err(Error::ArchiveCollision { file: path, first, second: record.id() });
            }
        }
        let pool = rayon::ThreadPoolBuilder::new().num_threads(concurrency.max(1)).build()?;
        let paths = pool.install(|| {
            records
                .par_iter()
                .map(|r| self.download(r).map(|p| (r.id(), p)))
                .collect::<Result<Vec<_>>>()
        })?;
        Ok(paths.into_iter().collect())
    }
}

/// Final path segment of the tarball URL, restricted to a plain `.tgz` name.
pub fn archive_file_name(url: &str) -> Result<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if is_safe_archive_name(name) {
        Ok(name.to_string())
    } else {
        Err(Error::InvalidArchiveName(url.to_string()))
    }
}

fn is_safe_archive_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix(".tgz") else { return false };
    let mut chars = stem.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

fn part_path(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".part");
    PathBuf::from(s)
}

/// Checksum, then a full read of the gzip/tar stream.
pub fn verify_archive(path: &Path, record: &VersionRecord) -> Result<()> {
    verify_checksums(path, record)?;
    verify_format(path)
}

fn verify_checksums(path: &Path, record: &VersionRecord) -> Result<()> {
    let mut sha1 = Sha1::new();
    let mut sha512 = Sha512::new();
    let mut file = File::open(path)?;
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sha1.update(&buf[..n]);
        sha512.update(&buf[..n]);
    }

    if let Some(expected) = record.dist.shasum.as_deref() {
        let actual = hex::encode(sha1.finalize());
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(Error::HashMismatch {
                file: path.to_path_buf(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    if let Some(integrity) = record.dist.integrity.as_deref() {
        if let Some(b64) = integrity.strip_prefix("sha512-") {
            let digest = sha512.finalize();
            let matches = STANDARD.decode(b64).map(|raw| raw == digest[..]).unwrap_or(false);
            if !matches {
                return Err(Error::HashMismatch {
                    file: path.to_path_buf(),
                    expected: integrity.to_string(),
                    actual: format!("sha512-{}", STANDARD.encode(digest)),
                });
            }
        }
    }
    Ok(())
}

fn verify_format(path: &Path) -> Result<()> {
    let invalid = |e: io::Error| Error::Verification { file: path.to_path_buf(), reason: e.to_string() };
    let mut archive = Archive::new(GzDecoder::new(File::open(path)?));
    let mut entries = 0usize;
    for entry in archive.entries().map_err(invalid)? {
        let mut entry = entry.map_err(invalid)?;
        io::copy(&mut entry, &mut io::sink()).map_err(invalid)?;
        entries += 1;
    }
    if entries == 0 {
        return Err(Error::Verification { file: path.to_path_buf(), reason: "archive is empty".into() });
    }
    Ok(())
}
