//! Dependency chains and the hoisting passes that shorten them.
//!
//! A chain is the path of package ids from a top-level request down to one
//! package; every chain becomes one directory in the install tree. Hoisting a
//! package truncates each chain that contains it so the chain starts at that
//! package, which places it at the top level.
//!
//! The passes are a heuristic. They never break a consumer's lookup but do not
//! look for the smallest possible tree.

use crate::error::{Error, Result};
use crate::platform::DependencyGraph;
use crate::resolver::PackageId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

pub type Chain = Vec<PackageId>;

#[derive(Debug)]
pub struct ChainSet<'g> {
    graph: &'g DependencyGraph,
    chains: BTreeSet<Chain>,
    /// Every version of each package name seen while enumerating.
    names: BTreeMap<String, BTreeSet<String>>,
}

impl<'g> ChainSet<'g> {
    /// Breadth-first enumeration of every chain reachable from `roots`.
    ///
    /// A dependency already on the chain at the same version closes a cycle and
    /// is not followed again. A dependency whose name is already on the chain at
    /// another version cannot be placed anywhere and fails the build.
    pub fn enumerate(roots: &[PackageId], graph: &'g DependencyGraph) -> Result<Self> {
        let mut set = Self { graph, chains: BTreeSet::new(), names: BTreeMap::new() };
        let mut queue: VecDeque<Chain> = roots.iter().map(|id| vec![id.clone()]).collect();

        while let Some(chain) = queue.pop_front() {
            let Some(last) = chain.last() else { continue };
            set.names.entry(last.name.clone()).or_default().insert(last.version.clone());

            for dep in set.deps(last) {
                if chain.iter().any(|c| c.name == dep.name && c.version != dep.version) {
                    let mut offending = chain.clone();
                    offending.push(dep.clone());
                    return Err(Error::UnresolvableCycle { chain: offending });
                }
                if chain.contains(dep) {
                    continue;
                }
                let mut next = chain.clone();
                next.push(dep.clone());
                queue.push_back(next);
            }
            set.chains.insert(chain);
        }
        debug!(chains = set.chains.len(), names = set.names.len(), "enumerated dependency chains");
        Ok(set)
    }

    pub fn chains(&self) -> &BTreeSet<Chain> {
        &self.chains
    }

    fn deps(&self, id: &PackageId) -> &'g [PackageId] {
        self.graph.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn is_root(&self, id: &PackageId) -> bool {
        self.chains.contains(std::slice::from_ref(id))
    }

    fn single_versioned(&self) -> Vec<PackageId> {
        self.names
            .iter()
            .filter(|(_, versions)| versions.len() == 1)
            .flat_map(|(name, versions)| versions.iter().map(move |v| PackageId::new(name.clone(), v.clone())))
            .collect()
    }

    fn multi_versioned(&self, name: &str) -> bool {
        self.names.get(name).map(|v| v.len() > 1).unwrap_or(false)
    }

    /// Truncate every chain holding `id` below the root. Returns whether
    /// anything moved.
    fn hoist(&mut self, id: &PackageId) -> bool {
        let moved: Vec<(Chain, usize)> = self
            .chains
            .iter()
            .filter_map(|c| position(c, id).filter(|&i| i > 0).map(|i| (c.clone(), i)))
            .collect();
        for (chain, index) in &moved {
            self.chains.remove(chain);
            self.chains.insert(chain[*index..].to_vec());
        }
        !moved.is_empty()
    }

    /// Hoist single-version packages whose own dependencies are all top-level
    /// already, repeating until nothing moves.
    pub fn hoist_settled(&mut self) {
        loop {
            let mut changed = false;
            for id in self.single_versioned() {
                if !self.deps(&id).iter().all(|d| self.is_root(d)) {
                    continue;
                }
                changed |= self.hoist(&id);
            }
            if !changed {
                break;
            }
        }
    }

    /// Hoist every remaining single-version package regardless of where its
    /// dependencies sit. Only one version exists, so nothing can shadow it.
    pub fn hoist_unique(&mut self) {
        for id in self.single_versioned() {
            self.hoist(&id);
        }
    }

    /// For names with several versions, hoist the ids that end the most chains
    /// first, wherever no ancestor level would end up holding another version
    /// of the same name.
    pub fn hoist_popular(&mut self) {
        let mut counts: BTreeMap<PackageId, usize> = BTreeMap::new();
        for chain in &self.chains {
            if let Some(last) = chain.last() {
                if self.multi_versioned(&last.name) {
                    *counts.entry(last.clone()).or_default() += 1;
                }
            }
        }
        let mut ranked: Vec<(usize, PackageId)> =
            counts.into_iter().filter(|(_, n)| *n >= 2).map(|(id, n)| (n, id)).collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

        for (_, id) in ranked {
            let candidates: Vec<Chain> =
                self.chains.iter().filter(|c| position(c, &id).is_some_and(|i| i > 0)).cloned().collect();
            for chain in candidates {
                let Some(index) = position(&chain, &id) else { continue };
                if chain[..index].iter().any(|c| c.name == id.name) {
                    continue;
                }
                if (0..index).any(|depth| self.shadowed(&chain[..depth], &id)) {
                    continue;
                }
                if self.chains.remove(&chain) {
                    self.chains.insert(chain[index..].to_vec());
                }
            }
        }
    }

    /// Whether some chain places a different version of `id`'s name directly
    /// below `prefix`.
    fn shadowed(&self, prefix: &[PackageId], id: &PackageId) -> bool {
        self.chains.iter().any(|c| {
            c.len() > prefix.len()
                && c[..prefix.len()] == *prefix
                && c[prefix.len()].name == id.name
                && c[prefix.len()] != *id
        })
    }
}

fn position(chain: &[PackageId], id: &PackageId) -> Option<usize> {
    chain.iter().position(|c| c == id)
}
