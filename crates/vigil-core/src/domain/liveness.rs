//! Echo pulses and declared intents.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Status stamped on an echo record by a commit.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PulseStatus {
    #[default]
    Alive,
}

/// Latest liveness pulse for one agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EchoRecord {
    pub agent: String,

    /// Monotonically non-decreasing per agent.
    pub last_echo: DateTime<Utc>,

    /// SHA-256 over agent name and pulse time. A uniqueness marker, not a
    /// security primitive.
    pub integrity_hash: String,

    pub status: PulseStatus,
}

impl EchoRecord {
    pub fn new(agent: &str, last_echo: DateTime<Utc>) -> Self {
        Self {
            agent: agent.to_string(),
            last_echo,
            integrity_hash: integrity_hash(agent, last_echo),
            status: PulseStatus::Alive,
        }
    }

    /// Recompute the hash and compare it with the stored one.
    pub fn hash_matches(&self) -> bool {
        self.integrity_hash == integrity_hash(&self.agent, self.last_echo)
    }
}

/// The `echo_pulses` document: one record per agent.
pub type EchoPulses = BTreeMap<String, EchoRecord>;

fn integrity_hash(agent: &str, at: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(agent.as_bytes());
    hasher.update(at.to_rfc3339_opts(SecondsFormat::Millis, true).as_bytes());
    hex::encode(hasher.finalize())
}

/// Outcome of checking an agent's pulse against a freshness threshold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EchoStatus {
    Fresh { age_ms: u64 },
    Stale { age_ms: u64 },
    NotFound,
}

impl EchoStatus {
    pub fn is_fresh(&self) -> bool {
        matches!(self, EchoStatus::Fresh { .. })
    }
}

/// A declaration of what an agent claims to be doing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IntentRecord {
    pub agent: String,
    pub declared_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn integrity_hash_is_stable_and_distinct() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let a = EchoRecord::new("scout", at);
        let b = EchoRecord::new("scout", at);
        let c = EchoRecord::new("ranger", at);

        assert_eq!(a.integrity_hash, b.integrity_hash);
        assert_ne!(a.integrity_hash, c.integrity_hash);
        assert_eq!(a.integrity_hash.len(), 64);
        assert!(a.hash_matches());
    }

    #[test]
    fn tampered_record_fails_hash_check() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let mut rec = EchoRecord::new("scout", at);
        rec.last_echo = at + chrono::Duration::seconds(60);
        assert!(!rec.hash_matches());
    }

    #[test]
    fn echo_record_wire_shape() {
        let at = Utc.timestamp_millis_opt(0).unwrap();
        let json = serde_json::to_value(EchoRecord::new("scout", at)).unwrap();
        assert_eq!(json["agent"], "scout");
        assert_eq!(json["status"], "alive");
        assert!(json.get("last_echo").is_some());
        assert!(json.get("integrity_hash").is_some());
    }

    #[test]
    fn intent_without_payload_omits_field() {
        let rec = IntentRecord {
            agent: "scout".to_string(),
            declared_at: Utc.timestamp_millis_opt(0).unwrap(),
            payload: None,
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert!(!json.contains("payload"));
    }
}
