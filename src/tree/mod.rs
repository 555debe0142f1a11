use crate::error::{Error, Result};
use crate::platform::{build_graph, DependencyGraph, Platform};
use crate::resolver::{Closure, PackageId, PackageSpec};
use std::collections::BTreeMap;

pub mod chains;

pub use chains::{Chain, ChainSet};

/// Nested placement: each key lives in the dependency-scope directory of its
/// parent node, roots in the project's.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InstallTree {
    pub children: BTreeMap<PackageId, InstallTree>,
}

impl InstallTree {
    pub fn from_chains<'a>(chains: impl IntoIterator<Item = &'a Chain>) -> Self {
        let mut tree = InstallTree::default();
        for chain in chains {
            let mut node = &mut tree;
            for id in chain {
                node = node.children.entry(id.clone()).or_default();
            }
        }
        tree
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of placed directories.
    pub fn node_count(&self) -> usize {
        self.children.values().map(|c| 1 + c.node_count()).sum()
    }

    /// Every id that ends up on disk, with its placement count.
    pub fn placements(&self) -> BTreeMap<PackageId, usize> {
        let mut out = BTreeMap::new();
        self.collect_placements(&mut out);
        out
    }

    fn collect_placements(&self, out: &mut BTreeMap<PackageId, usize>) {
        for (id, child) in &self.children {
            *out.entry(id.clone()).or_default() += 1;
            child.collect_placements(out);
        }
    }

    /// Dependency edges that a node-style upward directory search would not
    /// satisfy, as `(path to dependent, expected dependency)`.
    pub fn unresolved_edges(&self, graph: &DependencyGraph) -> Vec<(Vec<PackageId>, PackageId)> {
        let mut out = Vec::new();
        let mut path = Vec::new();
        let mut scopes = vec![self];
        self.walk_unresolved(graph, &mut path, &mut scopes, &mut out);
        out
    }

    fn walk_unresolved<'a>(
        &'a self,
        graph: &DependencyGraph,
        path: &mut Vec<PackageId>,
        scopes: &mut Vec<&'a InstallTree>,
        out: &mut Vec<(Vec<PackageId>, PackageId)>,
    ) {
        for (id, child) in &self.children {
            path.push(id.clone());
            scopes.push(child);
            for dep in graph.get(id).map(Vec::as_slice).unwrap_or(&[]) {
                let found = scopes
                    .iter()
                    .rev()
                    .find_map(|scope| scope.children.keys().find(|k| k.name == dep.name));
                if found != Some(dep) {
                    out.push((path.clone(), dep.clone()));
                }
            }
            child.walk_unresolved(graph, path, scopes, out);
            scopes.pop();
            path.pop();
        }
    }
}

/// Top-level requests as package ids, refusing unsupported platforms and two
/// versions of one name.
pub fn top_level_ids(specs: &[PackageSpec], closure: &Closure, platform: &Platform) -> Result<Vec<PackageId>> {
    let mut ids: Vec<PackageId> = Vec::with_capacity(specs.len());
    for spec in specs {
        let id = closure.id_for(spec).cloned().ok_or_else(|| Error::MissingRecord(spec.key()))?;
        let record = closure.record(&id).ok_or_else(|| Error::MissingRecord(id.to_string()))?;
        if !platform.supports(record) {
            return Err(Error::UnsupportedPlatform { id, top_level: true, platform: platform.to_string() });
        }
        if let Some(other) = ids.iter().find(|o| o.name == id.name && o.version != id.version) {
            return Err(Error::ConflictingRequests { first: other.clone(), second: id });
        }
        if !ids.contains(&id) {
            ids.push(id);
        }
    }
    Ok(ids)
}

/// Chain enumeration followed by the three hoisting passes, folded into a tree.
pub fn build_tree(roots: &[PackageId], graph: &DependencyGraph) -> Result<InstallTree> {
    let mut chains = ChainSet::enumerate(roots, graph)?;
    chains.hoist_settled();
    chains.hoist_unique();
    chains.hoist_popular();
    Ok(InstallTree::from_chains(chains.chains()))
}

#[derive(Debug, Clone)]
pub struct TreePlan {
    pub roots: Vec<PackageId>,
    pub graph: DependencyGraph,
    pub tree: InstallTree,
}

pub fn plan(specs: &[PackageSpec], closure: &Closure, platform: &Platform) -> Result<TreePlan> {
    let roots = top_level_ids(specs, closure, platform)?;
    let graph = build_graph(closure, platform)?;
    let tree = build_tree(&roots, &graph)?;
    Ok(TreePlan { roots, graph, tree })
}
