use crate::error::{Error, Result};
use crate::fsutil::encode_name;
use crate::resolver::PackageId;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("hoistpm/", env!("CARGO_PKG_VERSION"));

/// Transport to a registry. Implementations must be shareable across the
/// resolution and download worker pools.
pub trait RegistryClient: Send + Sync {
    fn fetch_document(&self, name: &str) -> Result<RegistryDocument>;

    /// Stream the archive at `url` into `out`, returning the byte count.
    fn fetch_tarball(&self, url: &str, out: &mut dyn Write) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct HttpRegistry {
    registry: String,
    client: Client,
}

impl HttpRegistry {
    pub fn new(registry: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::registry("http client", e))?;
        Ok(Self { registry: registry.into(), client })
    }

    pub fn document_url(&self, name: &str) -> String {
        format!("{}{}", self.registry, encode_name(name))
    }
}

impl RegistryClient for HttpRegistry {
    fn fetch_document(&self, name: &str) -> Result<RegistryDocument> {
        let url = self.document_url(name);
        let resp = self.client.get(&url).send().map_err(|e| Error::registry(name, e))?;
        if !resp.status().is_success() {
            return Err(Error::registry(name, format!("GET {url} returned {}", resp.status())));
        }
        let mut doc: RegistryDocument =
            resp.json().map_err(|e| Error::registry(name, format!("malformed document: {e}")))?;
        if doc.name.is_empty() {
            doc.name = name.to_string();
        }
        Ok(doc)
    }

    fn fetch_tarball(&self, url: &str, out: &mut dyn Write) -> Result<u64> {
        let mut resp = self.client.get(url).send().map_err(|e| Error::registry(url, e))?;
        if !resp.status().is_success() {
            return Err(Error::registry(url, format!("tarball fetch returned {}", resp.status())));
        }
        resp.copy_to(out).map_err(|e| Error::registry(url, e))
    }
}

/// Per-package registry metadata, reduced to the fields installs need.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegistryDocument {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct VersionRecord {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "optionalDependencies")]
    pub optional_dependencies: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub os: Vec<String>,
    #[serde(default, deserialize_with = "string_or_list")]
    pub cpu: Vec<String>,
    pub dist: Dist,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dist {
    pub tarball: String,
    #[serde(default)]
    pub shasum: Option<String>,
    #[serde(default)]
    pub integrity: Option<String>,
}

impl VersionRecord {
    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.version.clone())
    }

    /// Every declared edge as `(name, constraint, optional)`. Optional
    /// dependencies are usually mirrored in `dependencies`; both count once.
    pub fn dependency_edges(&self) -> impl Iterator<Item = (&str, &str, bool)> + '_ {
        let required = self.dependencies.iter().map(move |(n, c)| {
            (n.as_str(), c.as_str(), self.optional_dependencies.contains_key(n))
        });
        let optional_only = self
            .optional_dependencies
            .iter()
            .filter(move |(n, _)| !self.dependencies.contains_key(*n))
            .map(|(n, c)| (n.as_str(), c.as_str(), true));
        required.chain(optional_only)
    }
}

fn string_or_list<'de, D>(de: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null(()),
    }
    Ok(match OneOrMany::deserialize(de)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null(()) => Vec::new(),
    })
}
