use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use standor_core::StandorResult;

/// Counters describing the recovery subsystem's own activity.
///
/// Embedded in every checkpoint so a restored process knows how much
/// recovery history preceded it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecoveryMetrics {
    /// Checkpoints written since startup.
    pub checkpoints_created: u64,
    /// State-file saves since startup (manual and auto).
    pub state_saves: u64,
    /// Restores that validated and loaded.
    pub successful_recoveries: u64,
    /// Restores that failed (missing file or hash mismatch).
    pub failed_recoveries: u64,
    /// Integrity validations performed.
    pub integrity_checks: u64,
}

/// A named, timestamped snapshot of orchestrator state with an integrity
/// hash.
///
/// The wire format is fixed: top-level keys `checkpoint_name`, `timestamp`,
/// `system_state`, `additional_data`, `recovery_metrics`, and
/// `checkpoint_hash` — the lowercase-hex SHA-256 of the document serialized
/// with sorted keys and the hash field removed. Compressed checkpoints are
/// the same JSON gzip-wrapped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Caller-chosen checkpoint name.
    pub checkpoint_name: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Arbitrary orchestrator state.
    pub system_state: serde_json::Value,
    /// Arbitrary caller-supplied extras.
    pub additional_data: serde_json::Value,
    /// Recovery-subsystem counters at creation time.
    pub recovery_metrics: RecoveryMetrics,
    /// Content hash; `None` until the checkpoint is sealed.
    pub checkpoint_hash: Option<String>,
}

impl Checkpoint {
    /// Build an unsealed checkpoint.
    pub fn new(
        name: impl Into<String>,
        system_state: serde_json::Value,
        additional_data: serde_json::Value,
        recovery_metrics: RecoveryMetrics,
    ) -> Self {
        Self {
            checkpoint_name: name.into(),
            timestamp: Utc::now(),
            system_state,
            additional_data,
            recovery_metrics,
            checkpoint_hash: None,
        }
    }

    /// Hash of the document with the `checkpoint_hash` field removed,
    /// serialized with sorted keys.
    pub fn compute_hash(&self) -> StandorResult<String> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("checkpoint_hash");
        }
        // serde_json's map type is ordered, so this serialization is the
        // canonical sorted-keys form.
        let canonical = serde_json::to_string(&value)?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Fill in the content hash.
    pub fn seal(mut self) -> StandorResult<Self> {
        self.checkpoint_hash = Some(self.compute_hash()?);
        Ok(self)
    }

    /// Whether the stored hash matches the recomputed one. Unsealed
    /// checkpoints never verify.
    pub fn verify(&self) -> bool {
        match (&self.checkpoint_hash, self.compute_hash()) {
            (Some(stored), Ok(computed)) => *stored == computed,
            _ => false,
        }
    }
}

/// Summary of one on-disk checkpoint, as returned by
/// [`crate::RecoveryManager::list_checkpoints`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointInfo {
    /// File name within the checkpoints directory.
    pub file_name: String,
    /// The checkpoint's name.
    pub checkpoint_name: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Whether the file is gzip-compressed.
    pub compressed: bool,
    /// On-disk size in bytes.
    pub size_bytes: u64,
    /// Stored content hash, if the checkpoint was sealed.
    pub hash: Option<String>,
}
