//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge serialized defaults + `config.toml` +
//! `config.<env>.toml` + `APP_*` env vars (nested keys split on `__`, e.g.
//! `APP_RETRIEVAL__ALPHA=0.7`). Provides helpers to expand `~` and `${VAR}`
//! and to resolve relative paths against a known base directory.
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Wraps an already assembled figment; defaults are layered underneath.
    pub fn from_figment(figment: Figment) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(figment) }
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    /// Extracts and validates the full typed settings tree.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to extract settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Sharded in-process maps.
    Memory,
    /// Tantivy + LanceDB under `index.data_dir`.
    Embedded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Hybrid,
    Vector,
    Keyword,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub index: IndexSettings,
    pub retrieval: RetrievalSettings,
    pub memory: MemorySettings,
    pub assistant: AssistantSettings,
    pub ingest: IngestSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub dimension: usize,
    pub backend: BackendKind,
    pub data_dir: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { dimension: 384, backend: BackendKind::Memory, data_dir: "data/indexes".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Weight of the vector path in the fused score, in [0,1].
    pub alpha: f32,
    /// Each path is asked for `overfetch * k` candidates.
    pub overfetch: usize,
    pub top_k: usize,
    pub mode: SearchMode,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { alpha: 0.5, overfetch: 3, top_k: 5, mode: SearchMode::Hybrid }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    /// Cap on messages kept per session.
    pub max_messages: usize,
    /// Inactivity expiry in seconds; 0 keeps sessions until cleared.
    pub ttl_secs: u64,
    /// Messages read back into each prompt.
    pub history_limit: usize,
}

impl MemorySettings {
    pub fn ttl(&self) -> Option<Duration> {
        (self.ttl_secs > 0).then(|| Duration::from_secs(self.ttl_secs))
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self { max_messages: 20, ttl_secs: 3600, history_limit: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantSettings {
    pub context_budget_tokens: usize,
    /// Keep the user's message in memory even when completion fails.
    pub record_user_on_failure: bool,
    /// Store each finished turn in a long-term, searchable archive.
    pub archive_turns: bool,
    pub archive_top_k: usize,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self { context_budget_tokens: 3000, record_user_on_failure: false, archive_turns: false, archive_top_k: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
    pub max_tokens: usize,
    pub overlap_percent: f32,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self { max_tokens: 500, overlap_percent: 0.2 }
    }
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        let alpha = self.retrieval.alpha;
        if !(0.0..=1.0).contains(&alpha) {
            return Err(Error::InvalidConfig(format!("retrieval.alpha must be within [0,1], got {alpha}")));
        }
        if self.retrieval.overfetch == 0 {
            return Err(Error::InvalidConfig("retrieval.overfetch must be at least 1".into()));
        }
        if self.index.dimension == 0 {
            return Err(Error::InvalidConfig("index.dimension must be positive".into()));
        }
        if self.memory.max_messages == 0 {
            return Err(Error::InvalidConfig("memory.max_messages must be positive".into()));
        }
        let overlap = self.ingest.overlap_percent;
        if !(0.0..1.0).contains(&overlap) {
            return Err(Error::InvalidConfig(format!("ingest.overlap_percent must be within [0,1), got {overlap}")));
        }
        Ok(())
    }

    pub fn data_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.index.data_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
