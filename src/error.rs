use std::path::PathBuf;
use thiserror::Error;

use crate::resolver::PackageId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("registry error for {target}: {message}")]
    Registry { target: String, message: String },

    #[error("no version of {name} matches '{constraint}'")]
    NoMatchingVersion { name: String, constraint: String },

    #[error("{name} is listed in both dependencies and devDependencies")]
    DuplicateDependency { name: String },

    #[error("unresolvable cycle: {}", render_chain(.chain))]
    UnresolvableCycle { chain: Vec<PackageId> },

    #[error("cannot install {} {id}: unsupported platform {platform}", install_kind(.top_level))]
    UnsupportedPlatform { id: PackageId, top_level: bool, platform: String },

    #[error("conflicting top-level requests: {first} and {second}")]
    ConflictingRequests { first: PackageId, second: PackageId },

    #[error("hash mismatch for {}: expected {expected}, got {actual}", .file.display())]
    HashMismatch { file: PathBuf, expected: String, actual: String },

    #[error("archive {} failed verification: {reason}", .file.display())]
    Verification { file: PathBuf, reason: String },

    #[error("archive {} contains unsafe entry '{entry}'", .file.display())]
    UnsafeArchive { file: PathBuf, entry: String },

    #[error("failed to extract {} into {}: {reason}", .file.display(), .target.display())]
    Extraction { file: PathBuf, target: PathBuf, reason: String },

    #[error("invalid package specifier '{0}'")]
    InvalidSpec(String),

    #[error("invalid package name '{0}'")]
    InvalidPackageName(String),

    #[error("registry record for {requested} is named {found}")]
    NameMismatch { requested: String, found: String },

    #[error("refusing archive name derived from '{0}'")]
    InvalidArchiveName(String),

    #[error("{first} and {second} both map to archive {}", .file.display())]
    ArchiveCollision { file: PathBuf, first: PackageId, second: PackageId },

    #[error("no package.json found at {}", .0.display())]
    MissingManifest(PathBuf),

    #[error("missing resolved record for {0}")]
    MissingRecord(String),

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn registry(target: impl Into<String>, message: impl ToString) -> Self {
        Error::Registry { target: target.into(), message: message.to_string() }
    }

    /// True for failures the fetch pipeline answers with a fresh download.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::HashMismatch { .. } | Error::Verification { .. })
    }
}

fn install_kind(top_level: &bool) -> &'static str {
    if *top_level {
        "package"
    } else {
        "dependency"
    }
}

pub(crate) fn render_chain(chain: &[PackageId]) -> String {
    chain.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(" > ")
}
