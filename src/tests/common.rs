use crate::error::{Error, Result};
use crate::fetch::{Dist, RegistryClient, RegistryDocument, VersionRecord};
use crate::platform::DependencyGraph;
use crate::resolver::PackageId;
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const REGISTRY: &str = "https://registry.test/";

/// In-memory registry that counts calls and tracks how many are in flight.
#[derive(Default)]
pub struct FakeRegistry {
    docs: Mutex<HashMap<String, RegistryDocument>>,
    tarballs: Mutex<HashMap<String, Vec<u8>>>,
    /// url -> (bytes to serve instead, remaining times)
    tampered: Mutex<HashMap<String, (Vec<u8>, usize)>>,
    document_calls: Mutex<HashMap<String, usize>>,
    pub tarball_calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
    delay: Duration,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    /// Publish `name@version` with a generated archive; the newest publish
    /// becomes `latest`.
    pub fn publish(&self, name: &str, version: &str, deps: &[(&str, &str)]) -> VersionRecord {
        let bytes = tarball(&[("package/package.json", &manifest_json(name, version))]);
        self.publish_record(record(name, version, deps), bytes)
    }

    pub fn publish_record(&self, mut record: VersionRecord, bytes: Vec<u8>) -> VersionRecord {
        let base = record.name.rsplit('/').next().unwrap_or(&record.name).to_string();
        record.dist = Dist {
            tarball: format!("{REGISTRY}{}/-/{base}-{}.tgz", record.name, record.version),
            shasum: Some(sha1_hex(&bytes)),
            integrity: None,
        };
        self.tarballs.lock().insert(record.dist.tarball.clone(), bytes);
        let mut docs = self.docs.lock();
        let doc = docs.entry(record.name.clone()).or_insert_with(|| RegistryDocument {
            name: record.name.clone(),
            ..RegistryDocument::default()
        });
        doc.versions.insert(record.version.clone(), record.clone());
        doc.dist_tags.insert("latest".into(), record.version.clone());
        record
    }

    pub fn tag(&self, name: &str, tag: &str, version: &str) {
        if let Some(doc) = self.docs.lock().get_mut(name) {
            doc.dist_tags.insert(tag.into(), version.into());
        }
    }

    /// Serve `bytes` instead of the real archive for the next `times` fetches.
    pub fn tamper(&self, url: &str, bytes: Vec<u8>, times: usize) {
        self.tampered.lock().insert(url.to_string(), (bytes, times));
    }

    pub fn document_calls(&self, name: &str) -> usize {
        self.document_calls.lock().get(name).copied().unwrap_or(0)
    }

    pub fn total_document_calls(&self) -> usize {
        self.document_calls.lock().values().sum()
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RegistryClient for FakeRegistry {
    fn fetch_document(&self, name: &str) -> Result<RegistryDocument> {
        *self.document_calls.lock().entry(name.to_string()).or_default() += 1;
        self.enter();
        let doc = self.docs.lock().get(name).cloned();
        self.leave();
        doc.ok_or_else(|| Error::registry(name, "404 Not Found"))
    }

    fn fetch_tarball(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        self.tarball_calls.fetch_add(1, Ordering::SeqCst);
        self.enter();
        let tampered = {
            let mut tampered = self.tampered.lock();
            match tampered.get_mut(url) {
                Some((bytes, times)) if *times > 0 => {
                    *times -= 1;
                    Some(bytes.clone())
                }
                _ => None,
            }
        };
        let bytes = tampered.or_else(|| self.tarballs.lock().get(url).cloned());
        self.leave();
        let bytes = bytes.ok_or_else(|| Error::registry(url, "404 Not Found"))?;
        out.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }
}

pub fn record(name: &str, version: &str, deps: &[(&str, &str)]) -> VersionRecord {
    VersionRecord {
        name: name.into(),
        version: version.into(),
        dependencies: deps.iter().map(|(n, c)| (n.to_string(), c.to_string())).collect(),
        ..VersionRecord::default()
    }
}

pub fn manifest_json(name: &str, version: &str) -> String {
    format!(r#"{{"name":"{name}","version":"{version}"}}"#)
}

/// Gzipped tarball holding `files` at the given raw paths.
pub fn tarball(files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        // set_path would normalise the path; write the raw name instead.
        {
            let gnu = header.as_gnu_mut().expect("gnu header");
            gnu.name[..path.len()].copy_from_slice(path.as_bytes());
        }
        header.set_cksum();
        builder.append(&header, contents.as_bytes()).expect("append entry");
    }
    builder.into_inner().expect("finish tar").finish().expect("finish gzip")
}

pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}

pub fn id(raw: &str) -> PackageId {
    let (name, version) = raw.rsplit_once('@').expect("name@version");
    PackageId::new(name, version)
}

/// Graph from `("a@1", &["b@1"])` rows; every mentioned id gets a node.
pub fn graph(rows: &[(&str, &[&str])]) -> DependencyGraph {
    let mut g: DependencyGraph = BTreeMap::new();
    for (from, deps) in rows {
        let edges: Vec<PackageId> = deps.iter().map(|d| id(d)).collect();
        for e in &edges {
            g.entry(e.clone()).or_default();
        }
        g.insert(id(from), edges);
    }
    g
}
