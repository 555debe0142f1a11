use crate::error::{Error, Result};
use crate::resolver::PackageSpec;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default, rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Fails when a name is declared in both sections.
    pub fn check_duplicates(&self) -> Result<()> {
        if let Some(name) = self.dependencies.keys().find(|n| self.dev_dependencies.contains_key(*n)) {
            return Err(Error::DuplicateDependency { name: name.clone() });
        }
        Ok(())
    }

    /// dependencies followed by devDependencies.
    pub fn requested_specs(&self) -> Result<Vec<PackageSpec>> {
        self.check_duplicates()?;
        Ok(self
            .dependencies
            .iter()
            .chain(self.dev_dependencies.iter())
            .map(|(name, constraint)| PackageSpec::new(name.clone(), constraint.clone()))
            .collect())
    }
}

pub fn load(path: &Path) -> Result<Manifest> {
    if !path.exists() {
        return Err(Error::MissingManifest(path.to_path_buf()));
    }
    let data = fs::read_to_string(path)?;
    let m: Manifest = serde_json::from_str(&data)?;
    Ok(m)
}
