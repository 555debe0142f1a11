use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A requested dependency: a package name plus a version range, exact
/// version, dist-tag, or empty constraint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageSpec {
    pub name: String,
    pub constraint: String,
}

impl PackageSpec {
    pub fn new(name: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self { name: name.into(), constraint: constraint.into() }
    }

    /// Parse `name`, `name@constraint`, `@scope/name` or `@scope/name@constraint`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (name, constraint) = match raw.strip_prefix('@') {
            Some(rest) => match rest.split_once('@') {
                Some((name, range)) => (format!("@{name}"), range),
                None => (raw.to_string(), ""),
            },
            None => match raw.split_once('@') {
                Some((name, range)) => (name.to_string(), range),
                None => (raw.to_string(), ""),
            },
        };
        if !valid_name(&name) {
            return Err(Error::InvalidSpec(raw.to_string()));
        }
        Ok(Self::new(name, constraint.trim()))
    }

    /// `name@constraint`, the VersionMap key.
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.constraint)
    }
}

impl fmt::Display for PackageSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}@{}", self.name, self.constraint)
        }
    }
}

/// `name` or `@scope/name`, each part a plain path segment.
pub(crate) fn valid_name(name: &str) -> bool {
    match name.strip_prefix('@') {
        Some(scoped) => match scoped.split_once('/') {
            Some((scope, rest)) => valid_segment(scope) && valid_segment(rest),
            None => false,
        },
        None => valid_segment(name),
    }
}

fn valid_segment(part: &str) -> bool {
    !part.is_empty()
        && !part.starts_with('.')
        && part.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
}

/// Canonical identity of one concrete package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self { name: name.into(), version: version.into() }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}
