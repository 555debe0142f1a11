use crate::cache::MetadataCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::fetch::RegistryClient;
use crate::fsutil::package_dir;
use crate::platform::Platform;
use crate::resolver::{build_closure, Closure, PackageId, PackageSpec, Resolver};
use crate::tree::{self, InstallTree, TreePlan};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub mod extract;

pub use extract::{extract, list_entries};

/// Place every node of `tree` under `project_root`, breadth-first, each in
/// `<parent>/<modules_dir>/<name>`. Parents are always extracted before their
/// children. Returns the number of directories written.
pub fn place_tree(
    tree: &InstallTree,
    archives: &BTreeMap<PackageId, PathBuf>,
    project_root: &Path,
    modules_dir: &str,
) -> Result<usize> {
    let mut queue: VecDeque<(&InstallTree, PathBuf)> = VecDeque::new();
    queue.push_back((tree, project_root.to_path_buf()));
    let mut placed = 0usize;
    while let Some((node, parent)) = queue.pop_front() {
        for (id, child) in &node.children {
            let archive = archives.get(id).ok_or_else(|| Error::MissingRecord(id.to_string()))?;
            let dir = package_dir(&parent.join(modules_dir), &id.name)?;
            debug!(package = %id, dir = %dir.display(), "extracting");
            extract(archive, &dir)?;
            placed += 1;
            queue.push_back((child, dir));
        }
    }
    Ok(placed)
}

#[derive(Debug)]
pub struct InstallReport {
    pub closure: Closure,
    pub plan: TreePlan,
    pub placed: usize,
    pub elapsed: Duration,
}

/// Drives one install: closure, tree, downloads, placement.
pub struct Installer {
    config: Config,
    client: Arc<dyn RegistryClient>,
    platform: Platform,
}

impl Installer {
    pub fn new(config: Config, client: Arc<dyn RegistryClient>) -> Self {
        Self { config, client, platform: Platform::current() }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolve(&self, specs: &[PackageSpec]) -> Result<Closure> {
        let meta = Arc::new(MetadataCache::new(
            self.config.meta_dir(),
            self.config.meta_max_age_secs,
            self.client.clone(),
        ));
        let resolver = Resolver::new(meta);
        build_closure(&resolver, specs, self.config.resolve_concurrency)
    }

    pub fn install(&self, specs: &[PackageSpec], project_root: &Path) -> Result<InstallReport> {
        let start = Instant::now();
        let closure = self.resolve(specs)?;
        let plan = tree::plan(specs, &closure, &self.platform)?;
        for (path, dep) in plan.tree.unresolved_edges(&plan.graph) {
            warn!(dependent = %crate::error::render_chain(&path), dependency = %dep, "dependency not reachable from its dependent");
        }

        let store = crate::store::ArchiveStore::new(self.config.packages_dir(), self.client.clone());
        let archives = store.download_all(closure.table.values(), self.config.download_concurrency)?;
        let placed = place_tree(&plan.tree, &archives, project_root, &self.config.modules_dir)?;
        Ok(InstallReport { closure, plan, placed, elapsed: start.elapsed() })
    }
}
