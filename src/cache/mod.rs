//! Registry document cache.
//!
//! Two layers: an on-disk entry per package name under `<cache>/meta`, served
//! while younger than the freshness window, and a per-process memo that lets
//! concurrent callers for one name share a single load.

use crate::error::Result;
use crate::fetch::{RegistryClient, RegistryDocument};
use crate::fsutil::encode_name;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheEntry {
    pub name: String,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: i64,
    pub data: RegistryDocument,
}

type Slot = Arc<OnceCell<Arc<RegistryDocument>>>;

pub struct MetadataCache {
    dir: PathBuf,
    max_age_secs: u64,
    client: Arc<dyn RegistryClient>,
    dir_ready: OnceCell<()>,
    memo: Mutex<HashMap<String, Slot>>,
}

impl MetadataCache {
    pub fn new(dir: impl Into<PathBuf>, max_age_secs: u64, client: Arc<dyn RegistryClient>) -> Self {
        Self {
            dir: dir.into(),
            max_age_secs,
            client,
            dir_ready: OnceCell::new(),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn entry_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", encode_name(name)))
    }

    /// The document for `name`, loaded at most once per cache instance.
    pub fn document(&self, name: &str) -> Result<Arc<RegistryDocument>> {
        let slot = self.memo.lock().entry(name.to_string()).or_default().clone();
        // Callers racing on the same name block here until the first load
        // finishes; a failed load leaves the slot empty for a later retry.
        slot.get_or_try_init(|| self.load(name)).cloned()
    }

    fn load(&self, name: &str) -> Result<Arc<RegistryDocument>> {
        let path = self.entry_path(name);
        if let Some(doc) = self.read_fresh(&path, name) {
            return Ok(Arc::new(doc));
        }
        debug!(package = name, "fetching registry document");
        let doc = self.client.fetch_document(name)?;
        self.store(&path, name, &doc)?;
        Ok(Arc::new(doc))
    }

    fn read_fresh(&self, path: &Path, name: &str) -> Option<RegistryDocument> {
        let data = fs::read_to_string(path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                warn!(package = name, error = %e, "discarding unreadable metadata cache entry");
                return None;
            }
        };
        if entry.name != name {
            return None;
        }
        let age = now_secs().saturating_sub(entry.fetched_at);
        if age < 0 || age as u64 >= self.max_age_secs {
            debug!(package = name, fetched_at = %format_ts(entry.fetched_at), "metadata cache entry is stale");
            return None;
        }
        Some(entry.data)
    }

    fn store(&self, path: &Path, name: &str, doc: &RegistryDocument) -> Result<()> {
        self.dir_ready.get_or_try_init(|| fs::create_dir_all(&self.dir))?;
        let entry = CacheEntry { name: name.to_string(), fetched_at: now_secs(), data: doc.clone() };
        let tmp = path.with_extension("json.part");
        fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

pub fn now_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

fn format_ts(ts: i64) -> String {
    OffsetDateTime::from_unix_timestamp(ts)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| ts.to_string())
}
