//! Agent Source Enumerators.
//!
//! The Registry Hydrator never scans anything itself; it asks an
//! [`AgentSourceEnumerator`] for the current set of agent sources.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::domain::AgentSource;
use crate::error::{Result, VigilError};

/// Default file pattern for [`DirectoryEnumerator`].
pub const DEFAULT_SOURCE_PATTERN: &str = r"\.js$";

#[async_trait]
pub trait AgentSourceEnumerator: Send + Sync {
    async fn list_sources(&self) -> Result<Vec<AgentSource>>;
}

/// Lists files in one directory whose name matches a pattern.
///
/// The agent name is the file stem; `source_ref` is the full path. Results are
/// sorted by name. Subdirectories are skipped.
#[derive(Debug, Clone)]
pub struct DirectoryEnumerator {
    dir: PathBuf,
    pattern: Regex,
}

impl DirectoryEnumerator {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_pattern(dir, DEFAULT_SOURCE_PATTERN)
    }

    pub fn with_pattern(dir: impl Into<PathBuf>, pattern: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|e| VigilError::Config(format!("invalid source pattern {pattern:?}: {e}")))?;
        Ok(Self {
            dir: dir.into(),
            pattern,
        })
    }
}

#[async_trait]
impl AgentSourceEnumerator for DirectoryEnumerator {
    async fn list_sources(&self) -> Result<Vec<AgentSource>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            VigilError::Enumerator(format!("cannot read {}: {e}", self.dir.display()))
        })?;

        let mut sources = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| VigilError::Enumerator(e.to_string()))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| VigilError::Enumerator(e.to_string()))?;
            if !file_type.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                tracing::debug!(path = %entry.path().display(), "skipping non-UTF-8 file name");
                continue;
            };
            if !self.pattern.is_match(file_name) {
                continue;
            }

            let path = entry.path();
            let name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or(file_name)
                .to_string();
            sources.push(AgentSource::new(name, path.display().to_string()));
        }

        sources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sources)
    }
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    agents: Vec<ManifestAgent>,
}

#[derive(Debug, Deserialize)]
struct ManifestAgent {
    name: String,
    source: String,
}

/// Reads agent sources from a TOML manifest:
///
/// ```toml
/// [[agents]]
/// name = "scout"
/// source = "agents/scout.js"
/// ```
///
/// Relative sources resolve against the manifest's directory. Manifest order
/// is kept.
#[derive(Debug, Clone)]
pub struct ManifestEnumerator {
    path: PathBuf,
}

impl ManifestEnumerator {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn resolve(&self, source: &str) -> String {
        let source_path = Path::new(source);
        if source_path.is_absolute() {
            return source.to_string();
        }
        match self.path.parent() {
            Some(base) if !base.as_os_str().is_empty() => {
                base.join(source_path).display().to_string()
            }
            _ => source.to_string(),
        }
    }
}

#[async_trait]
impl AgentSourceEnumerator for ManifestEnumerator {
    async fn list_sources(&self) -> Result<Vec<AgentSource>> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            VigilError::Enumerator(format!("cannot read manifest {}: {e}", self.path.display()))
        })?;
        let manifest: Manifest = toml::from_str(&text).map_err(|e| {
            VigilError::Enumerator(format!("invalid manifest {}: {e}", self.path.display()))
        })?;

        Ok(manifest
            .agents
            .into_iter()
            .map(|a| {
                let source_ref = self.resolve(&a.source);
                AgentSource::new(a.name, source_ref)
            })
            .collect())
    }
}

/// A fixed list of sources.
#[derive(Debug, Clone, Default)]
pub struct StaticEnumerator {
    sources: Vec<AgentSource>,
}

impl StaticEnumerator {
    pub fn new(sources: Vec<AgentSource>) -> Self {
        Self { sources }
    }

    /// Sources whose `source_ref` equals their name.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|n| {
                    let n = n.into();
                    AgentSource::new(n.clone(), n)
                })
                .collect(),
        )
    }
}

#[async_trait]
impl AgentSourceEnumerator for StaticEnumerator {
    async fn list_sources(&self) -> Result<Vec<AgentSource>> {
        Ok(self.sources.clone())
    }
}
