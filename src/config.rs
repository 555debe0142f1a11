use crate::error::Result;
use crate::fsutil::default_cache_root;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";
pub const REGISTRY_ENV: &str = "HOISTPM_REGISTRY";
pub const CACHE_ENV: &str = "HOISTPM_CACHE";

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL; package documents live at `{registry}{name}`.
    pub registry: String,
    pub cache: PathBuf,
    /// Seconds a metadata cache entry is served without a network call.
    pub meta_max_age_secs: u64,
    pub resolve_concurrency: usize,
    pub download_concurrency: usize,
    /// Dependency-scope directory name used at every nesting level.
    pub modules_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: DEFAULT_REGISTRY.into(),
            cache: default_cache_root(),
            meta_max_age_secs: 300,
            resolve_concurrency: 20,
            download_concurrency: 10,
            modules_dir: "node_modules".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfigFile {
    registry: Option<String>,
    cache: Option<PathBuf>,
    meta_max_age_secs: Option<u64>,
    resolve_concurrency: Option<usize>,
    download_concurrency: Option<usize>,
    modules_dir: Option<String>,
}

impl Config {
    /// Defaults, then `<config_dir>/hoistpm/config.json`, then environment.
    pub fn load() -> Result<Self> {
        let file = dirs::config_dir().map(|d| d.join("hoistpm").join("config.json"));
        let mut cfg = match file {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        if let Ok(registry) = std::env::var(REGISTRY_ENV) {
            cfg.registry = registry;
        }
        if let Some(cache) = std::env::var_os(CACHE_ENV) {
            cfg.cache = PathBuf::from(cache);
        }
        cfg.registry = normalize_registry(&cfg.registry);
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let file: ConfigFile = serde_json::from_str(&data)?;
        let mut cfg = Self::default();
        if let Some(v) = file.registry {
            cfg.registry = normalize_registry(&v);
        }
        if let Some(v) = file.cache {
            cfg.cache = v;
        }
        if let Some(v) = file.meta_max_age_secs {
            cfg.meta_max_age_secs = v;
        }
        if let Some(v) = file.resolve_concurrency {
            cfg.resolve_concurrency = v.max(1);
        }
        if let Some(v) = file.download_concurrency {
            cfg.download_concurrency = v.max(1);
        }
        if let Some(v) = file.modules_dir {
            cfg.modules_dir = v;
        }
        Ok(cfg)
    }

    pub fn meta_dir(&self) -> PathBuf {
        self.cache.join("meta")
    }

    pub fn packages_dir(&self) -> PathBuf {
        self.cache.join("packages")
    }
}

pub fn normalize_registry(url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    }
}
