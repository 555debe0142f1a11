use crate::error::{Error, Result};
use crate::fetch::VersionRecord;
use crate::resolver::{Closure, PackageId};
use std::collections::BTreeMap;
use tracing::warn;

/// Pruned dependency edges per resolved package.
pub type DependencyGraph = BTreeMap<PackageId, Vec<PackageId>>;

/// Host identifiers in the vocabulary of `os` / `cpu` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub cpu: String,
}

impl Platform {
    pub fn current() -> Self {
        Self { os: node_platform().into(), cpu: node_arch().into() }
    }

    pub fn new(os: impl Into<String>, cpu: impl Into<String>) -> Self {
        Self { os: os.into(), cpu: cpu.into() }
    }

    pub fn supports(&self, record: &VersionRecord) -> bool {
        list_allows(&record.os, &self.os) && list_allows(&record.cpu, &self.cpu)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.os, self.cpu)
    }
}

// Empty list allows everything; `!name` entries deny, plain entries form an allow-list.
fn list_allows(list: &[String], host: &str) -> bool {
    if list.is_empty() {
        return true;
    }
    let mut allowed = None;
    for entry in list {
        if let Some(denied) = entry.strip_prefix('!') {
            if denied == host {
                return false;
            }
        } else {
            allowed.get_or_insert(false);
            if entry == host {
                allowed = Some(true);
            }
        }
    }
    allowed.unwrap_or(true)
}

/// Resolve every declared edge through the version map, dropping optional
/// edges to unsupported packages and failing on required ones.
pub fn build_graph(closure: &Closure, platform: &Platform) -> Result<DependencyGraph> {
    let mut graph = DependencyGraph::new();
    for (id, record) in &closure.table {
        let mut edges: Vec<PackageId> = Vec::new();
        for (name, constraint, optional) in record.dependency_edges() {
            let key = format!("{name}@{constraint}");
            let dep_id = closure.versions.get(&key).ok_or_else(|| Error::MissingRecord(key.clone()))?;
            let dep = closure.record(dep_id).ok_or_else(|| Error::MissingRecord(dep_id.to_string()))?;
            if !platform.supports(dep) {
                if optional {
                    warn!(dependency = %dep_id, dependent = %id, "skipping optional dependency: unsupported platform");
                    continue;
                }
                return Err(Error::UnsupportedPlatform {
                    id: dep_id.clone(),
                    top_level: false,
                    platform: platform.to_string(),
                });
            }
            if !edges.contains(dep_id) {
                edges.push(dep_id.clone());
            }
        }
        graph.insert(id.clone(), edges);
    }
    Ok(graph)
}

pub fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "windows" => "win32",
        "macos" => "darwin",
        "solaris" | "illumos" => "sunos",
        other => other,
    }
}

pub fn node_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc" => "ppc",
        "powerpc64" => "ppc64",
        other => other,
    }
}
