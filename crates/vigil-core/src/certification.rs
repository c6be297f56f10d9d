//! Certification Engine: checks that a subject's required state artifacts
//! are present and non-empty.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use vigil_ledger::{keys, put_typed, read_or_default, LedgerStore};

use crate::clock::SharedClock;
use crate::domain::{ArtifactStatus, CertificationResult, CertificationSnapshot};
use crate::error::Result;
use crate::obs;

/// One loaded artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Blob(Vec<u8>),
    /// Present but could not be read.
    Unreadable(String),
}

/// Classify one artifact.
///
/// `OK` for a non-empty JSON array or object, `EMPTY` for `[]`, `{}` or
/// `null`, `UNREADABLE` for anything else (absent, not JSON, a bare scalar).
pub fn classify(artifact: Option<&Artifact>) -> ArtifactStatus {
    let bytes = match artifact {
        Some(Artifact::Blob(bytes)) => bytes,
        Some(Artifact::Unreadable(_)) | None => return ArtifactStatus::Unreadable,
    };
    match serde_json::from_slice::<Value>(bytes) {
        Ok(Value::Null) => ArtifactStatus::Empty,
        Ok(Value::Array(items)) if items.is_empty() => ArtifactStatus::Empty,
        Ok(Value::Object(map)) if map.is_empty() => ArtifactStatus::Empty,
        Ok(Value::Array(_)) | Ok(Value::Object(_)) => ArtifactStatus::Ok,
        Ok(_) | Err(_) => ArtifactStatus::Unreadable,
    }
}

/// Certify `subject` against `required` artifacts. Pure.
///
/// An empty `required` list certifies vacuously.
pub fn certify(
    subject: &str,
    required: &[String],
    artifacts: &BTreeMap<String, Artifact>,
    verified_at: DateTime<Utc>,
) -> CertificationResult {
    let artifact_status: BTreeMap<String, ArtifactStatus> = required
        .iter()
        .map(|name| (name.clone(), classify(artifacts.get(name))))
        .collect();
    let certified = artifact_status.values().all(|s| *s == ArtifactStatus::Ok);

    CertificationResult {
        subject: subject.to_string(),
        verified_at,
        artifact_status,
        certified,
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    #[default]
    Agent,
    /// Groups state artifacts shared by several agents under one name.
    Module,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CertificationSubject {
    pub name: String,
    #[serde(default)]
    pub kind: SubjectKind,
    pub required: Vec<String>,
}

impl CertificationSubject {
    pub fn agent(name: impl Into<String>, required: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubjectKind::Agent,
            required,
        }
    }

    pub fn module(name: impl Into<String>, required: Vec<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubjectKind::Module,
            required,
        }
    }
}

/// Loads named artifacts for a subject. A missing artifact is left out of
/// the returned map.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn load(&self, subject: &str, names: &[String]) -> BTreeMap<String, Artifact>;
}

/// Reads `<root>/<subject>/<artifact>` from disk.
#[derive(Debug, Clone)]
pub struct DirArtifactSource {
    root: PathBuf,
}

impl DirArtifactSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ArtifactSource for DirArtifactSource {
    async fn load(&self, subject: &str, names: &[String]) -> BTreeMap<String, Artifact> {
        let dir = self.root.join(subject);
        let mut loaded = BTreeMap::new();
        for name in names {
            let path = dir.join(name);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    loaded.insert(name.clone(), Artifact::Blob(bytes));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "artifact absent");
                }
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "artifact unreadable");
                    loaded.insert(name.clone(), Artifact::Unreadable(e.to_string()));
                }
            }
        }
        loaded
    }
}

/// In-memory artifacts keyed by subject.
#[derive(Debug, Clone, Default)]
pub struct StaticArtifactSource {
    artifacts: BTreeMap<String, BTreeMap<String, Artifact>>,
}

impl StaticArtifactSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, subject: &str, name: &str, content: &str) -> Self {
        self.artifacts
            .entry(subject.to_string())
            .or_default()
            .insert(name.to_string(), Artifact::Blob(content.as_bytes().to_vec()));
        self
    }
}

#[async_trait]
impl ArtifactSource for StaticArtifactSource {
    async fn load(&self, subject: &str, names: &[String]) -> BTreeMap<String, Artifact> {
        let Some(all) = self.artifacts.get(subject) else {
            return BTreeMap::new();
        };
        names
            .iter()
            .filter_map(|n| all.get(n).map(|a| (n.clone(), a.clone())))
            .collect()
    }
}

pub struct CertificationEngine {
    store: Arc<dyn LedgerStore>,
    clock: SharedClock,
    source: Arc<dyn ArtifactSource>,
}

impl CertificationEngine {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        clock: SharedClock,
        source: Arc<dyn ArtifactSource>,
    ) -> Self {
        Self {
            store,
            clock,
            source,
        }
    }

    /// Load and certify one subject. Nothing is persisted.
    pub async fn certify_subject(&self, subject: &CertificationSubject) -> CertificationResult {
        let artifacts = self.source.load(&subject.name, &subject.required).await;
        certify(&subject.name, &subject.required, &artifacts, self.clock.now())
    }

    /// Certify every subject and store the snapshot.
    ///
    /// The existing `certification_current` is copied to
    /// `certification_previous` first, then replaced.
    pub async fn certify_all(&self, subjects: &[CertificationSubject]) -> Result<CertificationSnapshot> {
        let mut results = BTreeMap::new();
        for subject in subjects {
            let result = self.certify_subject(subject).await;
            results.insert(result.subject.clone(), result);
        }
        let snapshot = CertificationSnapshot {
            generated_at: self.clock.now(),
            results,
        };

        match self.store.get(keys::CERTIFICATION_CURRENT).await {
            Ok(Some(current)) => {
                self.store
                    .put_atomic(keys::CERTIFICATION_PREVIOUS, current)
                    .await?
            }
            Ok(None) => {}
            Err(e) if e.is_corrupt() => {
                warn!("current certification snapshot is corrupt, not rotating it");
            }
            Err(e) => return Err(e.into()),
        }
        put_typed(&*self.store, keys::CERTIFICATION_CURRENT, &snapshot).await?;

        let certified = snapshot.results.values().filter(|r| r.certified).count();
        obs::emit_certification_finished(snapshot.results.len(), certified);
        Ok(snapshot)
    }

    pub async fn current_snapshot(&self) -> Result<CertificationSnapshot> {
        Ok(read_or_default(&*self.store, keys::CERTIFICATION_CURRENT).await?)
    }

    pub async fn previous_snapshot(&self) -> Result<CertificationSnapshot> {
        Ok(read_or_default(&*self.store, keys::CERTIFICATION_PREVIOUS).await?)
    }
}
