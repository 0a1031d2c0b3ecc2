//! Pending confirmation registry
//!
//! Every operation takes the single mutex once and never performs I/O while
//! holding it. A payload leaves the registry through `decide` at most once.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::rules::Action;

const HASH_LEN: usize = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no pending action for hash {0}")]
    NotFound(String),

    #[error("action {hash} is already {state}")]
    InvalidState { hash: String, state: String },
}

/// What a confirmation is about
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "actions", rename_all = "lowercase")]
pub enum Payload {
    Single(Action),
    Multiple(Vec<Action>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Single(_) => "single",
            Payload::Multiple(_) => "multiple",
        }
    }

    pub fn actions(&self) -> Vec<&Action> {
        match self {
            Payload::Single(action) => vec![action],
            Payload::Multiple(actions) => actions.iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Execute,
    Skip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Created,
    Shown,
    Decided(Decision),
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordState::Created => write!(f, "created"),
            RecordState::Shown => write!(f, "shown"),
            RecordState::Decided(Decision::Execute) => write!(f, "decided (execute)"),
            RecordState::Decided(Decision::Skip) => write!(f, "decided (skip)"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfirmation {
    pub hash: String,
    pub path: PathBuf,
    pub payload: Payload,
    pub created_at: DateTime<Local>,
    pub state: RecordState,
    #[serde(skip)]
    registered: Instant,
}

impl PendingConfirmation {
    pub fn age_at(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.registered)
    }
}

#[derive(Debug, Default)]
pub struct ActionRegistry {
    records: Mutex<HashMap<String, PendingConfirmation>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, PendingConfirmation>> {
        // A panic while holding the lock cannot leave a half-applied record
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a new record and return its hash
    pub fn register(&self, path: &Path, payload: Payload) -> String {
        let serialized = serde_json::to_string(&payload).unwrap_or_default();
        let mut records = self.lock();

        let hash = loop {
            let candidate = compute_hash(path, &serialized);
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };

        log::debug!("Registered {} action {} for {}", payload.kind(), hash, path.display());
        records.insert(
            hash.clone(),
            PendingConfirmation {
                hash: hash.clone(),
                path: path.to_path_buf(),
                payload,
                created_at: Local::now(),
                state: RecordState::Created,
                registered: Instant::now(),
            },
        );
        hash
    }

    /// Created → Shown. Showing an already shown record is a no-op.
    pub fn mark_shown(&self, hash: &str) -> Result<(), RegistryError> {
        let mut records = self.lock();
        let record = records
            .get_mut(hash)
            .ok_or_else(|| RegistryError::NotFound(hash.to_string()))?;
        match record.state {
            RecordState::Created | RecordState::Shown => {
                record.state = RecordState::Shown;
                Ok(())
            }
            state @ RecordState::Decided(_) => Err(RegistryError::InvalidState {
                hash: hash.to_string(),
                state: state.to_string(),
            }),
        }
    }

    /// Record the decision and hand out the payload; only the first call succeeds
    pub fn decide(&self, hash: &str, decision: Decision) -> Result<PendingConfirmation, RegistryError> {
        let mut records = self.lock();
        match records.get_mut(hash) {
            Some(record) if !matches!(record.state, RecordState::Decided(_)) => {
                record.state = RecordState::Decided(decision);
                Ok(record.clone())
            }
            _ => Err(RegistryError::NotFound(hash.to_string())),
        }
    }

    pub fn retire(&self, hash: &str) -> bool {
        self.lock().remove(hash).is_some()
    }

    pub fn sweep_expired(&self, max_age: Duration) -> usize {
        self.sweep_expired_at(Instant::now(), max_age)
    }

    /// Remove every undecided record at least `max_age` old as of `now`
    pub fn sweep_expired_at(&self, now: Instant, max_age: Duration) -> usize {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|hash, record| {
            let expired = !matches!(record.state, RecordState::Decided(_)) && record.age_at(now) >= max_age;
            if expired {
                log::info!(
                    "Confirmation {} for {} expired ({})",
                    hash,
                    record.path.display(),
                    record.state
                );
            }
            !expired
        });
        before - records.len()
    }

    /// Snapshot of all records, oldest first
    pub fn pending(&self) -> Vec<PendingConfirmation> {
        let mut snapshot: Vec<_> = self.lock().values().cloned().collect();
        snapshot.sort_by_key(|r| r.registered);
        snapshot
    }

    pub fn get(&self, hash: &str) -> Option<PendingConfirmation> {
        self.lock().get(hash).cloned()
    }
}

fn compute_hash(path: &Path, serialized_payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update(serialized_payload.as_bytes());
    hasher.update(uuid::Uuid::new_v4().as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex[..HASH_LEN].to_string()
}
