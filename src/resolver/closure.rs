use super::{PackageId, PackageSpec, Resolver};
use crate::error::Result;
use crate::fetch::VersionRecord;
use rayon::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

pub type ResolvedTable = BTreeMap<PackageId, Arc<VersionRecord>>;
/// `name@constraint` -> the package that satisfies it.
pub type VersionMap = BTreeMap<String, PackageId>;

#[derive(Debug, Default, Clone)]
pub struct Closure {
    pub table: ResolvedTable,
    pub versions: VersionMap,
}

impl Closure {
    pub fn id_for(&self, spec: &PackageSpec) -> Option<&PackageId> {
        self.versions.get(&spec.key())
    }

    pub fn record(&self, id: &PackageId) -> Option<&Arc<VersionRecord>> {
        self.table.get(id)
    }
}

/// Breadth-first transitive resolution of `specs`. Each round resolves the
/// whole queue on a pool of `concurrency` workers; the next round is the set
/// of declared dependencies whose spec key has not been seen yet.
pub fn build_closure(resolver: &Resolver, specs: &[PackageSpec], concurrency: usize) -> Result<Closure> {
    let pool = rayon::ThreadPoolBuilder::new().num_threads(concurrency.max(1)).build()?;
    let mut closure = Closure::default();
    let mut queue: BTreeSet<PackageSpec> = specs.iter().cloned().collect();
    let mut round = 0usize;

    while !queue.is_empty() {
        round += 1;
        debug!(round, specs = queue.len(), "resolving");
        let batch: Vec<PackageSpec> = std::mem::take(&mut queue).into_iter().collect();
        let resolved: Vec<Arc<VersionRecord>> = pool.install(|| {
            batch
                .par_iter()
                .map(|spec| resolver.resolve(&spec.name, &spec.constraint))
                .collect::<Result<Vec<_>>>()
        })?;

        for (spec, record) in batch.iter().zip(&resolved) {
            let id = record.id();
            closure.versions.insert(spec.key(), id.clone());
            closure.table.entry(id).or_insert_with(|| record.clone());
        }

        for record in &resolved {
            for (name, constraint, _) in record.dependency_edges() {
                let next = PackageSpec::new(name, constraint);
                if !closure.versions.contains_key(&next.key()) {
                    queue.insert(next);
                }
            }
        }
    }

    Ok(closure)
}
