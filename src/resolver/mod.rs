use crate::cache::MetadataCache;
use crate::error::{Error, Result};
use crate::fetch::{RegistryDocument, VersionRecord};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use semver::{Version, VersionReq};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

pub mod closure;
pub mod spec;

pub use closure::{build_closure, Closure, ResolvedTable, VersionMap};
pub use spec::{PackageId, PackageSpec};

type Slot = Arc<OnceCell<Arc<VersionRecord>>>;

/// Maps `(name, constraint)` to one concrete version record, memoized by
/// `name@constraint` for the lifetime of the resolver.
pub struct Resolver {
    meta: Arc<MetadataCache>,
    memo: Mutex<HashMap<String, Slot>>,
}

impl Resolver {
    pub fn new(meta: Arc<MetadataCache>) -> Self {
        Self { meta, memo: Mutex::new(HashMap::new()) }
    }

    pub fn resolve(&self, name: &str, constraint: &str) -> Result<Arc<VersionRecord>> {
        let key = format!("{name}@{constraint}");
        let slot = self.memo.lock().entry(key).or_default().clone();
        slot.get_or_try_init(|| {
            if !spec::valid_name(name) {
                return Err(Error::InvalidPackageName(name.to_string()));
            }
            let doc = self.meta.document(name)?;
            let version = match_version(&doc, constraint)?;
            let mut record = doc.versions[version].clone();
            if record.name.is_empty() {
                record.name = name.to_string();
            } else if record.name != name {
                return Err(Error::NameMismatch { requested: name.to_string(), found: record.name });
            }
            if record.version.is_empty() {
                record.version = version.to_string();
            }
            Ok(Arc::new(record))
        })
        .cloned()
    }
}

/// Pick a version string out of `doc` for `constraint`. First match wins:
/// exact version, dist-tag, `latest` (when empty or satisfying), highest
/// satisfying version.
pub fn match_version<'a>(doc: &'a RegistryDocument, constraint: &str) -> Result<&'a str> {
    let no_match = || Error::NoMatchingVersion {
        name: doc.name.clone(),
        constraint: constraint.to_string(),
    };

    if let Some((version, _)) = doc.versions.get_key_value(constraint) {
        return Ok(version);
    }
    if let Some(tagged) = doc.dist_tags.get(constraint) {
        return doc.versions.get_key_value(tagged).map(|(v, _)| v.as_str()).ok_or_else(no_match);
    }

    let latest = doc
        .dist_tags
        .get("latest")
        .and_then(|v| doc.versions.get_key_value(v))
        .map(|(v, _)| v.as_str());
    let trimmed = constraint.trim();
    if trimmed.is_empty() {
        if let Some(latest) = latest {
            return Ok(latest);
        }
    }

    let range = VersionRange::parse(trimmed).map_err(|_| no_match())?;
    if let Some(latest) = latest {
        if Version::parse(latest).map(|v| range.matches(&v)).unwrap_or(false) {
            return Ok(latest);
        }
    }

    let mut candidates: Vec<(Version, &str)> = doc
        .versions
        .keys()
        .filter_map(|k| Version::parse(k).ok().map(|v| (v, k.as_str())))
        .collect();
    candidates.sort_by(|a, b| b.0.cmp(&a.0)); // descending
    candidates
        .into_iter()
        .find(|(v, _)| range.matches(v))
        .map(|(_, k)| k)
        .ok_or_else(no_match)
}

/// An npm range: one or more `||`-separated comparator sets.
#[derive(Debug, Clone)]
pub struct VersionRange {
    reqs: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(range: &str) -> Result<Self, semver::Error> {
        let reqs = range
            .split("||")
            .map(str::trim)
            .filter(|p| !p.is_empty() || !range.contains("||"))
            .map(|p| {
                let norm = canonicalize_npm_range(p);
                if norm == "*" {
                    Ok(VersionReq::STAR)
                } else {
                    VersionReq::from_str(&norm)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        if reqs.is_empty() {
            return Ok(Self { reqs: vec![VersionReq::STAR] });
        }
        Ok(Self { reqs })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.reqs.iter().any(|r| r.matches(version))
    }
}

/// Rewrite a single npm comparator set into `semver::VersionReq` syntax.
pub fn canonicalize_npm_range(input: &str) -> String {
    let s = input.trim();
    if s.is_empty() || s == "*" || s.eq_ignore_ascii_case("x") || s == "latest" {
        return "*".into();
    }

    // A bare full version is exact in npm; semver would read it as a caret.
    if Version::parse(s.trim_start_matches('v')).is_ok() {
        return format!("={}", s.trim_start_matches('v'));
    }

    // Hyphen range: "1.2.3 - 2.3.4" => ">=1.2.3, <=2.3.4"
    if let Some((left, right)) = s.split_once(" - ") {
        let (left, right) = (left.trim(), right.trim());
        if is_version_like(left) && is_version_like(right) {
            return format!(">={left}, <={right}");
        }
    }

    let tokens: Vec<&str> = s.split_whitespace().collect();
    if tokens.len() > 1 {
        let mut comps: Vec<String> = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            let t = tokens[i];
            if is_op(t) {
                match tokens.get(i + 1) {
                    Some(ver) => {
                        comps.push(format!("{t}{ver}"));
                        i += 2;
                        continue;
                    }
                    None => return s.to_string(),
                }
            }
            if t.chars().next().map(|c| c.is_ascii_digit() || "<>=^~".contains(c)).unwrap_or(false) {
                comps.push(t.to_string());
                i += 1;
                continue;
            }
            return s.to_string();
        }
        return comps.join(", ");
    }

    if is_numeric(s) {
        return format!("^{s}.0.0");
    }
    // "1.2" means 1.2.x in npm but ^1.2 to semver.
    if let Some((maj, min)) = s.split_once('.') {
        if let (Ok(maj), Ok(min)) = (maj.parse::<u64>(), min.parse::<u64>()) {
            return format!(">={maj}.{min}.0, <{maj}.{}.0", min + 1);
        }
    }
    if s.contains(['x', 'X', '*']) {
        return expand_wildcard(s);
    }
    s.to_string()
}

fn is_op(t: &str) -> bool {
    matches!(t, ">" | "<" | ">=" | "<=" | "=" | "^" | "~")
}

fn is_numeric(t: &str) -> bool {
    !t.is_empty() && t.chars().all(|c| c.is_ascii_digit())
}

fn is_version_like(t: &str) -> bool {
    t.chars().any(|c| c.is_ascii_digit())
        && t.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '*' | '+'))
}

fn expand_wildcard(pattern: &str) -> String {
    let wild = |p: &str| p.eq_ignore_ascii_case("x") || p == "*";
    let parts: Vec<&str> = pattern.split('.').collect();
    match parts.as_slice() {
        [maj, min] if wild(min) => match maj.parse::<u64>() {
            Ok(maj) => format!(">={maj}.0.0, <{}.0.0", maj + 1),
            Err(_) => pattern.to_string(),
        },
        [maj, min, patch] if wild(min) && wild(patch) => match maj.parse::<u64>() {
            Ok(maj) => format!(">={maj}.0.0, <{}.0.0", maj + 1),
            Err(_) => pattern.to_string(),
        },
        [maj, min, patch] if wild(patch) => match (maj.parse::<u64>(), min.parse::<u64>()) {
            (Ok(maj), Ok(min)) => format!(">={maj}.{min}.0, <{maj}.{}.0", min + 1),
            _ => pattern.to_string(),
        },
        _ => pattern.to_string(),
    }
}
