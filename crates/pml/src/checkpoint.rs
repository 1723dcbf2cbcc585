// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Checkpointing: durable workflow state at every layer boundary.
//!
//! Checkpointing enables:
//! - Resume execution after interruption
//! - Pause/resume workflows (agent- and human-in-the-loop gates)
//! - State snapshots for debugging and audit
//!
//! Snapshots are content-addressed: a SHA-256 over the canonical JSON of the
//! state. Consecutive identical snapshots for the same workflow coalesce into
//! an alias record pointing at the prior snapshot, so idle layers cost one
//! index entry instead of a full copy.
//!
//! File format (20-byte header + payload):
//! - Bytes 0-3:   Magic "PMLC"
//! - Bytes 4-7:   Format version (u32 little-endian)
//! - Bytes 8-11:  CRC32 checksum of payload (u32 little-endian)
//! - Bytes 12-19: Payload length (u64 little-endian)
//! - Bytes 20+:   Payload (JSON-serialized checkpoint)

use crate::canonical::content_hash;
use crate::constants::{DEFAULT_FINALIZED_CHECKPOINT_TTL, DEFAULT_KEEP_CHECKPOINT_LAYERS};
use crate::error::{Error, Result};
use crate::state::WorkflowState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Unique checkpoint identifier.
pub type CheckpointId = String;

/// Magic bytes identifying a PML checkpoint file.
const CHECKPOINT_MAGIC: &[u8; 4] = b"PMLC";

/// Current format version; increment on header or payload format changes.
const CHECKPOINT_FORMAT_VERSION: u32 = 1;

/// Header size: magic(4) + version(4) + crc32(4) + length(8).
const CHECKPOINT_HEADER_SIZE: usize = 20;

/// A durable snapshot of workflow state at a layer boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: CheckpointId,
    pub workflow_id: String,
    pub layer: usize,
    pub state: WorkflowState,
    pub created_at: DateTime<Utc>,
    /// SHA-256 over the canonical JSON of `state`.
    pub content_hash: String,
    /// Set on the checkpoint written at workflow completion.
    #[serde(default)]
    pub finalized: bool,
}

impl Checkpoint {
    /// Snapshot the given state. The content hash is computed here so stores
    /// can coalesce without re-serializing.
    pub fn new(workflow_id: impl Into<String>, layer: usize, state: WorkflowState) -> Self {
        let workflow_id = workflow_id.into();
        let hash = serde_json::to_value(&state)
            .map(|v| content_hash(&v))
            .unwrap_or_default();
        let id = format!(
            "{workflow_id}_L{layer}_{}",
            uuid::Uuid::new_v4().simple()
        );
        Self {
            id,
            workflow_id,
            layer,
            state,
            created_at: Utc::now(),
            content_hash: hash,
            finalized: false,
        }
    }

    /// Mark this as the final checkpoint of its workflow.
    #[must_use]
    pub fn finalized(mut self) -> Self {
        self.finalized = true;
        self
    }
}

/// Lightweight checkpoint listing entry, without the state payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub id: CheckpointId,
    pub workflow_id: String,
    pub layer: usize,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    /// When set, this record coalesced into the named prior checkpoint.
    #[serde(default)]
    pub alias_of: Option<CheckpointId>,
    #[serde(default)]
    pub finalized: bool,
}

impl From<&Checkpoint> for CheckpointMetadata {
    fn from(checkpoint: &Checkpoint) -> Self {
        Self {
            id: checkpoint.id.clone(),
            workflow_id: checkpoint.workflow_id.clone(),
            layer: checkpoint.layer,
            created_at: checkpoint.created_at,
            content_hash: checkpoint.content_hash.clone(),
            alias_of: None,
            finalized: checkpoint.finalized,
        }
    }
}

/// Retention policy applied by [`CheckpointStore::prune`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    /// Newest checkpoints kept per workflow; the final checkpoint is always
    /// kept in addition.
    pub keep_layers: usize,
    /// Finalized workflows older than this are deleted entirely.
    pub finalized_ttl: Duration,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_layers: DEFAULT_KEEP_CHECKPOINT_LAYERS,
            finalized_ttl: DEFAULT_FINALIZED_CHECKPOINT_TTL,
        }
    }
}

/// Checkpoint persistence contract.
///
/// Implementations must linearize saves per `workflow_id`; the executor
/// issues at most one save at a time per workflow, but stores are shared
/// across workflows.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist a checkpoint durably before returning.
    async fn save(&self, checkpoint: Checkpoint) -> Result<CheckpointId>;

    /// Load a checkpoint by id, resolving alias records to their target
    /// state. `Ok(None)` when the id is unknown.
    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>>;

    /// List checkpoint metadata for a workflow, newest first.
    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>>;

    /// The most recent loadable checkpoint for a workflow.
    async fn latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>> {
        for meta in self.list(workflow_id).await? {
            if let Some(checkpoint) = self.load(&meta.id).await? {
                return Ok(Some(checkpoint));
            }
        }
        Ok(None)
    }

    /// Delete a single checkpoint.
    async fn delete(&self, checkpoint_id: &str) -> Result<()>;

    /// Delete every checkpoint of a workflow.
    async fn delete_workflow(&self, workflow_id: &str) -> Result<()> {
        for meta in self.list(workflow_id).await? {
            self.delete(&meta.id).await?;
        }
        Ok(())
    }

    /// Apply the retention policy to one workflow. Returns the number of
    /// checkpoints removed.
    async fn prune(&self, workflow_id: &str, policy: &RetentionPolicy) -> Result<usize> {
        let metas = self.list(workflow_id).await?;
        if metas.is_empty() {
            return Ok(0);
        }

        // Finalized workflows past their TTL are dropped whole.
        let newest = &metas[0];
        if newest.finalized {
            let age = Utc::now().signed_duration_since(newest.created_at);
            if age.to_std().map(|a| a > policy.finalized_ttl).unwrap_or(false) {
                let count = metas.len();
                self.delete_workflow(workflow_id).await?;
                return Ok(count);
            }
        }

        // Otherwise keep the newest N plus anything finalized or aliased-to.
        let keep_ids: Vec<&str> = metas
            .iter()
            .take(policy.keep_layers)
            .map(|m| m.id.as_str())
            .collect();
        let alias_targets: Vec<&str> = metas
            .iter()
            .filter_map(|m| m.alias_of.as_deref())
            .collect();

        let mut removed = 0;
        for meta in &metas {
            let kept = keep_ids.contains(&meta.id.as_str())
                || alias_targets.contains(&meta.id.as_str())
                || meta.finalized;
            if !kept {
                self.delete(&meta.id).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// ============================================================================
// Integrity framing
// ============================================================================

/// Prepend the integrity header to a serialized payload.
fn wrap_payload(data: &[u8]) -> Vec<u8> {
    let checksum = crc32fast::hash(data);
    let mut out = Vec::with_capacity(CHECKPOINT_HEADER_SIZE + data.len());
    out.extend_from_slice(CHECKPOINT_MAGIC);
    out.extend_from_slice(&CHECKPOINT_FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&checksum.to_le_bytes());
    out.extend_from_slice(&(data.len() as u64).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Verify the integrity header and return the payload slice.
fn unwrap_payload(data: &[u8]) -> Result<&[u8]> {
    if data.len() < CHECKPOINT_HEADER_SIZE {
        return Err(Error::CheckpointIntegrity(format!(
            "file too small: {} bytes (minimum {CHECKPOINT_HEADER_SIZE})",
            data.len()
        )));
    }
    if &data[0..4] != CHECKPOINT_MAGIC {
        return Err(Error::CheckpointIntegrity(format!(
            "invalid magic bytes {:?}",
            &data[0..4]
        )));
    }
    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&data[4..8]);
    let version = u32::from_le_bytes(version_bytes);
    if version > CHECKPOINT_FORMAT_VERSION {
        return Err(Error::CheckpointIntegrity(format!(
            "unsupported format version {version} (supported up to {CHECKPOINT_FORMAT_VERSION})"
        )));
    }
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&data[8..12]);
    let expected = u32::from_le_bytes(crc_bytes);
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&data[12..20]);
    let declared = u64::from_le_bytes(len_bytes);

    let payload = &data[CHECKPOINT_HEADER_SIZE..];
    if payload.len() as u64 != declared {
        return Err(Error::CheckpointIntegrity(format!(
            "length mismatch: declared {declared}, actual {}",
            payload.len()
        )));
    }
    let computed = crc32fast::hash(payload);
    if computed != expected {
        return Err(Error::CheckpointIntegrity(format!(
            "checksum mismatch: expected {expected:#010x}, computed {computed:#010x}"
        )));
    }
    Ok(payload)
}

// ============================================================================
// Stores
// ============================================================================

#[derive(Debug, Clone)]
enum StoredRecord {
    Full(Checkpoint),
    Alias {
        meta: CheckpointMetadata,
        target: CheckpointId,
    },
}

impl StoredRecord {
    fn meta(&self) -> CheckpointMetadata {
        match self {
            StoredRecord::Full(cp) => CheckpointMetadata::from(cp),
            StoredRecord::Alias { meta, .. } => meta.clone(),
        }
    }
}

/// In-memory checkpoint storage for tests and ephemeral workflows.
#[derive(Clone, Default)]
pub struct MemoryCheckpointStore {
    records: Arc<parking_lot::Mutex<HashMap<CheckpointId, StoredRecord>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of full (non-alias) snapshots held.
    pub fn full_snapshot_count(&self) -> usize {
        self.records
            .lock()
            .values()
            .filter(|r| matches!(r, StoredRecord::Full(_)))
            .count()
    }

    fn newest_meta(&self, workflow_id: &str) -> Option<CheckpointMetadata> {
        let records = self.records.lock();
        let mut metas: Vec<CheckpointMetadata> = records
            .values()
            .map(StoredRecord::meta)
            .filter(|m| m.workflow_id == workflow_id)
            .collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        metas.into_iter().next()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<CheckpointId> {
        let id = checkpoint.id.clone();

        // Coalesce when the newest checkpoint for this workflow carries the
        // same content hash.
        if let Some(prev) = self.newest_meta(&checkpoint.workflow_id) {
            if prev.content_hash == checkpoint.content_hash {
                let target = prev.alias_of.clone().unwrap_or(prev.id);
                let mut meta = CheckpointMetadata::from(&checkpoint);
                meta.alias_of = Some(target.clone());
                self.records
                    .lock()
                    .insert(id.clone(), StoredRecord::Alias { meta, target });
                return Ok(id);
            }
        }

        self.records
            .lock()
            .insert(id.clone(), StoredRecord::Full(checkpoint));
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let record = { self.records.lock().get(checkpoint_id).cloned() };
        match record {
            None => Ok(None),
            Some(StoredRecord::Full(cp)) => Ok(Some(cp)),
            Some(StoredRecord::Alias { meta, target }) => {
                let records = self.records.lock();
                match records.get(&target) {
                    Some(StoredRecord::Full(cp)) => {
                        let mut resolved = cp.clone();
                        resolved.id = meta.id;
                        resolved.layer = meta.layer;
                        resolved.created_at = meta.created_at;
                        resolved.finalized = meta.finalized;
                        Ok(Some(resolved))
                    }
                    _ => Err(Error::Checkpoint(format!(
                        "alias '{checkpoint_id}' points at missing checkpoint '{target}'"
                    ))),
                }
            }
        }
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>> {
        let records = self.records.lock();
        let mut metas: Vec<CheckpointMetadata> = records
            .values()
            .map(StoredRecord::meta)
            .filter(|m| m.workflow_id == workflow_id)
            .collect();
        metas.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(metas)
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<()> {
        self.records.lock().remove(checkpoint_id);
        Ok(())
    }

    async fn delete_workflow(&self, workflow_id: &str) -> Result<()> {
        self.records
            .lock()
            .retain(|_, r| r.meta().workflow_id != workflow_id);
        Ok(())
    }
}

/// File-backed checkpoint storage.
///
/// One `.ckpt` file per full snapshot under the root directory, plus a JSON
/// index mapping workflows to their ordered checkpoint metadata. Alias
/// records live only in the index. Corrupt snapshot files surface a
/// [`Error::CheckpointIntegrity`] on load and are skipped by `latest`.
pub struct FileCheckpointStore {
    root: PathBuf,
    index: parking_lot::Mutex<HashMap<String, Vec<CheckpointMetadata>>>,
}

impl FileCheckpointStore {
    /// Open (or create) a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Checkpoint(format!("create checkpoint dir: {e}")))?;
        let index = Self::read_index(&root)?;
        Ok(Self {
            root,
            index: parking_lot::Mutex::new(index),
        })
    }

    fn index_path(root: &Path) -> PathBuf {
        root.join("index.json")
    }

    fn snapshot_path(&self, id: &str) -> PathBuf {
        // Checkpoint ids are generated internally and contain no separators,
        // but sanitize anyway so a hostile id cannot escape the root.
        let safe: String = id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("{safe}.ckpt"))
    }

    fn read_index(root: &Path) -> Result<HashMap<String, Vec<CheckpointMetadata>>> {
        let path = Self::index_path(root);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let data = std::fs::read(&path)
            .map_err(|e| Error::Checkpoint(format!("read checkpoint index: {e}")))?;
        serde_json::from_slice(&data).map_err(Error::from)
    }

    fn write_index(&self, index: &HashMap<String, Vec<CheckpointMetadata>>) -> Result<()> {
        let data = serde_json::to_vec_pretty(index)?;
        let path = Self::index_path(&self.root);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| Error::Checkpoint(format!("write checkpoint index: {e}")))
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<CheckpointId> {
        let id = checkpoint.id.clone();
        let mut index = self.index.lock();
        let entries = index.entry(checkpoint.workflow_id.clone()).or_default();

        let mut meta = CheckpointMetadata::from(&checkpoint);
        let coalesce_target = entries.first().and_then(|prev| {
            (prev.content_hash == checkpoint.content_hash)
                .then(|| prev.alias_of.clone().unwrap_or_else(|| prev.id.clone()))
        });

        match coalesce_target {
            Some(target) => {
                meta.alias_of = Some(target);
            }
            None => {
                let payload = serde_json::to_vec(&checkpoint)?;
                let framed = wrap_payload(&payload);
                std::fs::write(self.snapshot_path(&id), framed)
                    .map_err(|e| Error::Checkpoint(format!("write checkpoint: {e}")))?;
            }
        }

        entries.insert(0, meta);
        let snapshot = index.clone();
        drop(index);
        self.write_index(&snapshot)?;
        Ok(id)
    }

    async fn load(&self, checkpoint_id: &str) -> Result<Option<Checkpoint>> {
        let meta = {
            let index = self.index.lock();
            index
                .values()
                .flatten()
                .find(|m| m.id == checkpoint_id)
                .cloned()
        };
        let Some(meta) = meta else {
            return Ok(None);
        };

        let target = meta.alias_of.clone().unwrap_or_else(|| meta.id.clone());
        let path = self.snapshot_path(&target);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Error::Checkpoint(format!("read checkpoint: {e}"))),
        };
        let payload = unwrap_payload(&data)?;
        let mut checkpoint: Checkpoint = serde_json::from_slice(payload)?;
        checkpoint.id = meta.id;
        checkpoint.layer = meta.layer;
        checkpoint.created_at = meta.created_at;
        checkpoint.finalized = meta.finalized;
        Ok(Some(checkpoint))
    }

    async fn latest(&self, workflow_id: &str) -> Result<Option<Checkpoint>> {
        for meta in self.list(workflow_id).await? {
            match self.load(&meta.id).await {
                Ok(Some(checkpoint)) => return Ok(Some(checkpoint)),
                Ok(None) => continue,
                Err(Error::CheckpointIntegrity(reason)) => {
                    tracing::warn!(
                        checkpoint_id = %meta.id,
                        %reason,
                        "skipping corrupt checkpoint"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<CheckpointMetadata>> {
        Ok(self
            .index
            .lock()
            .get(workflow_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn delete(&self, checkpoint_id: &str) -> Result<()> {
        let mut index = self.index.lock();
        for entries in index.values_mut() {
            entries.retain(|m| m.id != checkpoint_id);
        }
        index.retain(|_, entries| !entries.is_empty());
        let snapshot = index.clone();
        drop(index);
        self.write_index(&snapshot)?;

        let path = self.snapshot_path(checkpoint_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Checkpoint(format!("delete checkpoint: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::Sanitizer;
    use crate::state::{reduce, StateUpdate, WorkflowState};
    use crate::task::TaskResult;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn state(workflow_id: &str) -> WorkflowState {
        WorkflowState::new(workflow_id, BTreeMap::new(), &Sanitizer::new())
    }

    fn state_with_result(workflow_id: &str, task_id: &str) -> WorkflowState {
        let sanitizer = Sanitizer::new();
        reduce(
            &state(workflow_id),
            &StateUpdate::for_layer(0).record(
                TaskResult::success(task_id, json!({"ok": true}), 1),
                &sanitizer,
            ),
        )
    }

    #[tokio::test]
    async fn memory_store_round_trips_checkpoints() {
        let store = MemoryCheckpointStore::new();
        let checkpoint = Checkpoint::new("wf", 0, state_with_result("wf", "a"));
        let id = store.save(checkpoint.clone()).await.unwrap();

        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.state, checkpoint.state);
        assert_eq!(loaded.layer, 0);
    }

    #[tokio::test]
    async fn identical_consecutive_snapshots_coalesce() {
        let store = MemoryCheckpointStore::new();
        let s = state_with_result("wf", "a");

        store.save(Checkpoint::new("wf", 0, s.clone())).await.unwrap();
        let alias_id = store.save(Checkpoint::new("wf", 1, s.clone())).await.unwrap();
        let alias2_id = store.save(Checkpoint::new("wf", 2, s.clone())).await.unwrap();

        assert_eq!(store.full_snapshot_count(), 1);
        assert_eq!(store.len(), 3);

        // Aliases still load the full state with their own identity.
        let loaded = store.load(&alias_id).await.unwrap().unwrap();
        assert_eq!(loaded.layer, 1);
        assert_eq!(loaded.state, s);
        let loaded = store.load(&alias2_id).await.unwrap().unwrap();
        assert_eq!(loaded.layer, 2);
    }

    #[tokio::test]
    async fn changed_state_breaks_the_coalescing_chain() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint::new("wf", 0, state_with_result("wf", "a")))
            .await
            .unwrap();
        store
            .save(Checkpoint::new("wf", 1, state_with_result("wf", "b")))
            .await
            .unwrap();
        assert_eq!(store.full_snapshot_count(), 2);
    }

    #[tokio::test]
    async fn latest_returns_newest_checkpoint() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint::new("wf", 0, state_with_result("wf", "a")))
            .await
            .unwrap();
        store
            .save(Checkpoint::new("wf", 1, state_with_result("wf", "b")))
            .await
            .unwrap();

        let latest = store.latest("wf").await.unwrap().unwrap();
        assert_eq!(latest.layer, 1);
        assert!(store.latest("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn workflows_are_isolated() {
        let store = MemoryCheckpointStore::new();
        store
            .save(Checkpoint::new("wf1", 0, state_with_result("wf1", "a")))
            .await
            .unwrap();
        store
            .save(Checkpoint::new("wf2", 0, state_with_result("wf2", "b")))
            .await
            .unwrap();

        assert_eq!(store.list("wf1").await.unwrap().len(), 1);
        store.delete_workflow("wf1").await.unwrap();
        assert!(store.list("wf1").await.unwrap().is_empty());
        assert_eq!(store.list("wf2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn prune_keeps_newest_and_finalized() {
        let store = MemoryCheckpointStore::new();
        for layer in 0..6 {
            store
                .save(Checkpoint::new(
                    "wf",
                    layer,
                    state_with_result("wf", &format!("t{layer}")),
                ))
                .await
                .unwrap();
        }
        let policy = RetentionPolicy {
            keep_layers: 2,
            finalized_ttl: Duration::from_secs(3600),
        };
        let removed = store.prune("wf", &policy).await.unwrap();
        assert_eq!(removed, 4);

        let remaining = store.list("wf").await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].layer, 5);
    }

    #[tokio::test]
    async fn prune_deletes_expired_finalized_workflows() {
        let store = MemoryCheckpointStore::new();
        let mut checkpoint = Checkpoint::new("wf", 3, state_with_result("wf", "a")).finalized();
        checkpoint.created_at = Utc::now() - chrono::Duration::hours(48);
        store.save(checkpoint).await.unwrap();

        let removed = store.prune("wf", &RetentionPolicy::default()).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.list("wf").await.unwrap().is_empty());
    }

    #[test]
    fn integrity_round_trip() {
        let payload = br#"{"hello":"world"}"#;
        let framed = wrap_payload(payload);
        assert_eq!(unwrap_payload(&framed).unwrap(), payload);
    }

    #[test]
    fn integrity_detects_corruption() {
        let mut framed = wrap_payload(b"payload bytes");
        let last = framed.len() - 1;
        framed[last] ^= 0xFF;
        let err = unwrap_payload(&framed).unwrap_err();
        assert!(matches!(err, Error::CheckpointIntegrity(_)));
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn integrity_rejects_bad_magic_and_short_files() {
        assert!(unwrap_payload(b"PML").is_err());
        let mut framed = wrap_payload(b"data");
        framed[0] = b'X';
        assert!(unwrap_payload(&framed).is_err());
    }

    #[tokio::test]
    async fn file_store_round_trips_and_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = Checkpoint::new("wf", 0, state_with_result("wf", "a"));
        let id = checkpoint.id.clone();

        {
            let store = FileCheckpointStore::new(dir.path()).unwrap();
            store.save(checkpoint.clone()).await.unwrap();
        }

        // Reopen from disk.
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let loaded = store.load(&id).await.unwrap().unwrap();
        assert_eq!(loaded.state, checkpoint.state);
        assert_eq!(store.list("wf").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn file_store_coalesces_identical_snapshots_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let s = state_with_result("wf", "a");

        store.save(Checkpoint::new("wf", 0, s.clone())).await.unwrap();
        let alias_id = store.save(Checkpoint::new("wf", 1, s.clone())).await.unwrap();

        let ckpt_files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "ckpt").unwrap_or(false))
            .count();
        assert_eq!(ckpt_files, 1);

        let loaded = store.load(&alias_id).await.unwrap().unwrap();
        assert_eq!(loaded.layer, 1);
        assert_eq!(loaded.state, s);
    }

    #[tokio::test]
    async fn file_store_latest_skips_corrupt_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();

        let first = Checkpoint::new("wf", 0, state_with_result("wf", "a"));
        let first_id = first.id.clone();
        store.save(first).await.unwrap();
        let second = Checkpoint::new("wf", 1, state_with_result("wf", "b"));
        let second_id = second.id.clone();
        store.save(second).await.unwrap();

        // Corrupt the newest snapshot file.
        let path = store.snapshot_path(&second_id);
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();

        let latest = store.latest("wf").await.unwrap().unwrap();
        assert_eq!(latest.id, first_id);
    }

    #[tokio::test]
    async fn file_store_delete_removes_file_and_index_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCheckpointStore::new(dir.path()).unwrap();
        let checkpoint = Checkpoint::new("wf", 0, state_with_result("wf", "a"));
        let id = checkpoint.id.clone();
        store.save(checkpoint).await.unwrap();

        store.delete(&id).await.unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        assert!(store.list("wf").await.unwrap().is_empty());
    }
}
