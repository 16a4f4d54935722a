use crate::checkpoint::{Checkpoint, CheckpointInfo, RecoveryMetrics};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use standor_core::{StandorError, StandorResult};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const STATE_FILE: &str = "system_state.json";
const INTEGRITY_FILE: &str = "data_integrity.json";
const CHECKPOINTS_DIR: &str = "checkpoints";
const BACKUP_PREFIX: &str = "system_state_backup_";
const CHECKPOINT_PREFIX: &str = "checkpoint_";
const FORMAT_VERSION: &str = "1";

/// Retention and cadence knobs for the recovery subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Background auto-save interval in seconds.
    #[serde(default = "default_auto_save_interval_secs")]
    pub auto_save_interval_secs: u64,
    /// How many timestamped state-file backups to keep.
    #[serde(default = "default_max_state_backups")]
    pub max_state_backups: usize,
    /// Checkpoints older than this many days are gzip-compressed.
    #[serde(default = "default_compress_after_days")]
    pub compress_after_days: i64,
}

fn default_auto_save_interval_secs() -> u64 {
    300
}

fn default_max_state_backups() -> usize {
    10
}

fn default_compress_after_days() -> i64 {
    7
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            auto_save_interval_secs: default_auto_save_interval_secs(),
            max_state_backups: default_max_state_backups(),
            compress_after_days: default_compress_after_days(),
        }
    }
}

/// Result of a system integrity validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// When the validation ran.
    pub timestamp: DateTime<Utc>,
    /// Whether every check passed.
    pub overall_valid: bool,
    /// Names of the checks that ran.
    pub checks_performed: Vec<String>,
    /// Hard failures.
    pub errors: Vec<String>,
    /// Soft findings that do not invalidate the system.
    pub warnings: Vec<String>,
}

/// Persists orchestrator state to durable storage and restores it.
///
/// Owns a recovery directory containing `system_state.json` (plus rolling
/// backups), a `checkpoints/` directory of hashed checkpoint documents, and
/// `data_integrity.json` with the latest validation report. Every operation
/// is independent: a failed save is logged by the caller and retried next
/// cycle rather than propagated as a crash.
pub struct RecoveryManager {
    root: PathBuf,
    checkpoints_dir: PathBuf,
    config: RecoveryConfig,
    current_state: RwLock<serde_json::Value>,
    metrics: RwLock<RecoveryMetrics>,
    last_checkpoint_at: RwLock<DateTime<Utc>>,
    auto_save_active: AtomicBool,
    auto_save_task: Mutex<Option<JoinHandle<()>>>,
}

impl RecoveryManager {
    /// Open (creating if needed) a recovery directory.
    pub async fn new(root: impl Into<PathBuf>, config: RecoveryConfig) -> StandorResult<Self> {
        let root = root.into();
        let checkpoints_dir = root.join(CHECKPOINTS_DIR);
        tokio::fs::create_dir_all(&checkpoints_dir).await?;
        Ok(Self {
            root,
            checkpoints_dir,
            config,
            current_state: RwLock::new(serde_json::Value::Null),
            metrics: RwLock::new(RecoveryMetrics::default()),
            last_checkpoint_at: RwLock::new(Utc::now()),
            auto_save_active: AtomicBool::new(false),
            auto_save_task: Mutex::new(None),
        })
    }

    fn state_file(&self) -> PathBuf {
        self.root.join(STATE_FILE)
    }

    /// Whether a previous session left a non-empty state file behind.
    pub fn has_previous_state(&self) -> bool {
        self.state_file()
            .metadata()
            .map(|m| m.len() > 0)
            .unwrap_or(false)
    }

    /// Replace the in-memory state the auto-save task persists.
    pub async fn set_current_state(&self, state: serde_json::Value) {
        *self.current_state.write().await = state;
    }

    /// The in-memory state as last set or saved.
    pub async fn current_state(&self) -> serde_json::Value {
        self.current_state.read().await.clone()
    }

    /// Current recovery-subsystem counters.
    pub async fn recovery_metrics(&self) -> RecoveryMetrics {
        self.metrics.read().await.clone()
    }

    /// When the last checkpoint was written (process start if none yet).
    pub async fn last_checkpoint_at(&self) -> DateTime<Utc> {
        *self.last_checkpoint_at.read().await
    }

    /// Whether the periodic-checkpoint interval has elapsed.
    pub async fn should_checkpoint(&self, interval: Duration) -> bool {
        let last = *self.last_checkpoint_at.read().await;
        Utc::now() - last
            > chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero())
    }

    /// Counters plus auto-save status and on-disk checkpoint count.
    pub async fn metrics_report(&self) -> serde_json::Value {
        let metrics = self.metrics.read().await.clone();
        let total = self
            .list_checkpoints()
            .await
            .map(|c| c.len())
            .unwrap_or(0);
        serde_json::json!({
            "counters": metrics,
            "last_checkpoint_at": *self.last_checkpoint_at.read().await,
            "auto_save_active": self.auto_save_active.load(Ordering::SeqCst),
            "total_checkpoints": total,
        })
    }

    // --- State file ---

    /// Persist a state document, rotating a timestamped backup of the
    /// previous file first. The document gains a `saved_at` timestamp and a
    /// `recovery` metadata block (auto-save flag, content hash, format
    /// version).
    pub async fn save_state(
        &self,
        state: serde_json::Value,
        auto_save: bool,
    ) -> StandorResult<()> {
        let mut enhanced = match state {
            serde_json::Value::Object(map) => serde_json::Value::Object(map),
            other => serde_json::json!({ "state": other }),
        };
        let hash = state_content_hash(&enhanced)?;
        if let Some(obj) = enhanced.as_object_mut() {
            obj.insert("saved_at".to_string(), serde_json::json!(Utc::now()));
            obj.insert(
                "recovery".to_string(),
                serde_json::json!({
                    "auto_save": auto_save,
                    "state_hash": hash,
                    "format_version": FORMAT_VERSION,
                }),
            );
        }

        self.rotate_state_backup().await?;
        tokio::fs::write(self.state_file(), serde_json::to_string_pretty(&enhanced)?).await?;

        *self.current_state.write().await = enhanced;
        self.metrics.write().await.state_saves += 1;
        if !auto_save {
            info!("system state saved");
        }
        Ok(())
    }

    /// Load the state file from a previous session, if present.
    pub async fn load_previous_state(&self) -> StandorResult<Option<serde_json::Value>> {
        let path = self.state_file();
        if !path.exists() {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let state: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| StandorError::Recovery(format!("state file is not valid JSON: {e}")))?;
        info!("loaded previous session state");
        Ok(Some(state))
    }

    async fn rotate_state_backup(&self) -> StandorResult<()> {
        let path = self.state_file();
        if path.exists() {
            let backup = self.root.join(format!(
                "{}{}.json",
                BACKUP_PREFIX,
                Utc::now().format("%Y%m%d_%H%M%S_%f")
            ));
            tokio::fs::copy(&path, &backup).await?;
            self.prune_backups().await?;
        }
        Ok(())
    }

    async fn prune_backups(&self) -> StandorResult<()> {
        let mut backups = list_files_with_prefix(&self.root, BACKUP_PREFIX).await?;
        backups.sort();
        if backups.len() > self.config.max_state_backups {
            let excess = backups.len() - self.config.max_state_backups;
            for stale in backups.into_iter().take(excess) {
                tokio::fs::remove_file(&stale).await?;
            }
        }
        Ok(())
    }

    // --- Checkpoints ---

    /// Write a sealed checkpoint of the current in-memory state. Returns the
    /// path written.
    pub async fn create_checkpoint(
        &self,
        name: &str,
        additional_data: serde_json::Value,
    ) -> StandorResult<PathBuf> {
        let state = self.current_state.read().await.clone();
        let metrics = self.metrics.read().await.clone();
        let checkpoint = Checkpoint::new(name, state, additional_data, metrics).seal()?;

        let path = self.checkpoints_dir.join(format!(
            "{}{}_{}.json",
            CHECKPOINT_PREFIX,
            name,
            Utc::now().format("%Y%m%d_%H%M%S_%f")
        ));
        tokio::fs::write(&path, serde_json::to_string_pretty(&checkpoint)?).await?;

        if let Err(e) = self.compress_checkpoints(self.config.compress_after_days).await {
            warn!(error = %e, "checkpoint compression pass failed");
        }

        self.metrics.write().await.checkpoints_created += 1;
        *self.last_checkpoint_at.write().await = Utc::now();
        info!(checkpoint = name, path = %path.display(), "checkpoint created");
        Ok(path)
    }

    /// List every on-disk checkpoint, oldest file first. Unreadable files
    /// are skipped with a warning.
    pub async fn list_checkpoints(&self) -> StandorResult<Vec<CheckpointInfo>> {
        let mut infos = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.checkpoints_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(CHECKPOINT_PREFIX)
                || !(name.ends_with(".json") || name.ends_with(".json.gz"))
            {
                continue;
            }
            match read_checkpoint_file(&path).await {
                Ok(checkpoint) => {
                    let size = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
                    infos.push(CheckpointInfo {
                        file_name: name.to_string(),
                        checkpoint_name: checkpoint.checkpoint_name,
                        timestamp: checkpoint.timestamp,
                        compressed: name.ends_with(".gz"),
                        size_bytes: size,
                        hash: checkpoint.checkpoint_hash,
                    });
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable checkpoint"),
            }
        }
        infos.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        Ok(infos)
    }

    /// Restore the named checkpoint (most recent file wins when several
    /// share the name). `Ok(None)` when no such checkpoint exists; an error
    /// when the newest match fails integrity validation.
    pub async fn restore_checkpoint(
        &self,
        name: &str,
    ) -> StandorResult<Option<serde_json::Value>> {
        let prefix = format!("{CHECKPOINT_PREFIX}{name}_");
        let mut matches = list_files_with_prefix(&self.checkpoints_dir, &prefix).await?;
        matches.sort();
        let Some(path) = matches.last() else {
            return Ok(None);
        };

        let checkpoint = match read_checkpoint_file(path).await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                self.metrics.write().await.failed_recoveries += 1;
                return Err(e);
            }
        };
        if !checkpoint.verify() {
            self.metrics.write().await.failed_recoveries += 1;
            return Err(StandorError::Recovery(format!(
                "checkpoint '{name}' failed integrity validation"
            )));
        }

        self.save_state(checkpoint.system_state.clone(), false).await?;
        self.metrics.write().await.successful_recoveries += 1;
        info!(checkpoint = name, "restored from checkpoint");
        Ok(Some(checkpoint.system_state))
    }

    /// Walk checkpoints newest-first until one validates; fall back to the
    /// documented minimal state when none do.
    pub async fn repair_system_state(&self) -> StandorResult<serde_json::Value> {
        info!("attempting system state repair");
        let mut infos = self.list_checkpoints().await?;
        infos.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        for inf in &infos {
            match self.restore_checkpoint(&inf.checkpoint_name).await {
                Ok(Some(state)) => {
                    info!(checkpoint = %inf.checkpoint_name, "repaired state from checkpoint");
                    return Ok(state);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(
                        checkpoint = %inf.checkpoint_name,
                        error = %e,
                        "checkpoint rejected during repair"
                    );
                }
            }
        }

        warn!("no valid checkpoint found, falling back to minimal state");
        let minimal = Self::minimal_state();
        self.save_state(minimal.clone(), false).await?;
        Ok(minimal)
    }

    /// The empty state used when nothing on disk can be trusted.
    pub fn minimal_state() -> serde_json::Value {
        serde_json::json!({
            "system_initialized": false,
            "recovery_active": true,
            "orchestrator_running": false,
            "categories": [],
            "agents": {},
            "tasks": { "pending": 0, "in_progress": 0, "completed": 0 },
            "emergency_recovery_created": true,
        })
    }

    /// Gzip-compress uncompressed checkpoints older than the given age.
    /// Returns how many files were compressed. A negative age compresses
    /// everything.
    pub async fn compress_checkpoints(&self, older_than_days: i64) -> StandorResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(older_than_days);
        let mut compressed = 0;

        let mut entries = tokio::fs::read_dir(&self.checkpoints_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with(CHECKPOINT_PREFIX) || !name.ends_with(".json") {
                continue;
            }
            if file_modified_at(&path).await? >= cutoff {
                continue;
            }

            let bytes = tokio::fs::read(&path).await?;
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&bytes)?;
            let gz = encoder.finish()?;
            tokio::fs::write(path.with_extension("json.gz"), gz).await?;
            tokio::fs::remove_file(&path).await?;
            compressed += 1;
        }

        if compressed > 0 {
            info!(compressed, "compressed aged checkpoints");
        }
        Ok(compressed)
    }

    /// Delete state backups and compressed checkpoints older than the given
    /// number of days. Returns how many files were removed.
    pub async fn cleanup_old_files(&self, days_to_keep: i64) -> StandorResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(days_to_keep);
        let mut deleted = 0;

        for path in list_files_with_prefix(&self.root, BACKUP_PREFIX).await? {
            if file_modified_at(&path).await? < cutoff {
                tokio::fs::remove_file(&path).await?;
                deleted += 1;
            }
        }

        let mut entries = tokio::fs::read_dir(&self.checkpoints_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_gz = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".json.gz"));
            if is_gz && file_modified_at(&path).await? < cutoff {
                tokio::fs::remove_file(&path).await?;
                deleted += 1;
            }
        }

        info!(deleted, "cleaned up old recovery files");
        Ok(deleted)
    }

    // --- Integrity ---

    /// Validate the state file, every checkpoint, and the directory
    /// structure. The report is also persisted to `data_integrity.json`
    /// (best-effort).
    pub async fn validate_system_integrity(&self) -> IntegrityReport {
        let mut report = IntegrityReport {
            timestamp: Utc::now(),
            overall_valid: true,
            checks_performed: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
        };

        report.checks_performed.push("state_file".to_string());
        if let Err(e) = self.validate_state_file().await {
            report.overall_valid = false;
            report.errors.push(e.to_string());
        }

        report.checks_performed.push("checkpoints".to_string());
        match self.list_checkpoints().await {
            Ok(infos) => {
                for inf in infos {
                    let path = self.checkpoints_dir.join(&inf.file_name);
                    match read_checkpoint_file(&path).await {
                        Ok(checkpoint) if checkpoint.verify() => {}
                        Ok(_) => {
                            report.overall_valid = false;
                            report.errors.push(format!(
                                "checkpoint '{}' failed hash validation",
                                inf.file_name
                            ));
                        }
                        Err(e) => {
                            report
                                .warnings
                                .push(format!("checkpoint '{}' unreadable: {e}", inf.file_name));
                        }
                    }
                }
            }
            Err(e) => {
                report.overall_valid = false;
                report.errors.push(format!("cannot list checkpoints: {e}"));
            }
        }

        report.checks_performed.push("directories".to_string());
        for dir in [&self.root, &self.checkpoints_dir] {
            if !dir.is_dir() {
                report.overall_valid = false;
                report
                    .errors
                    .push(format!("required directory missing: {}", dir.display()));
            }
        }

        self.metrics.write().await.integrity_checks += 1;

        match serde_json::to_string_pretty(&report) {
            Ok(json) => {
                if let Err(e) = tokio::fs::write(self.root.join(INTEGRITY_FILE), json).await {
                    warn!(error = %e, "could not persist integrity report");
                }
            }
            Err(e) => warn!(error = %e, "could not serialize integrity report"),
        }

        report
    }

    async fn validate_state_file(&self) -> StandorResult<()> {
        let path = self.state_file();
        if !path.exists() {
            return Err(StandorError::Recovery(
                "state file does not exist".to_string(),
            ));
        }
        let content = tokio::fs::read_to_string(&path).await?;
        let state: serde_json::Value = serde_json::from_str(&content)
            .map_err(|e| StandorError::Recovery(format!("state file is not valid JSON: {e}")))?;

        let stored = state
            .get("recovery")
            .and_then(|r| r.get("state_hash"))
            .and_then(serde_json::Value::as_str);
        if let Some(stored) = stored {
            let computed = state_content_hash(&state)?;
            if stored != computed {
                return Err(StandorError::Recovery(
                    "state file hash validation failed".to_string(),
                ));
            }
        }
        Ok(())
    }

    // --- Auto-save ---

    /// Spawn the background auto-save task. A second call while it is
    /// running is a no-op.
    pub async fn start_auto_save(self: &Arc<Self>) {
        if self.auto_save_active.swap(true, Ordering::SeqCst) {
            return;
        }
        let manager = Arc::clone(self);
        let interval = Duration::from_secs(self.config.auto_save_interval_secs);
        let handle = tokio::spawn(async move {
            while manager.auto_save_active.load(Ordering::SeqCst) {
                tokio::time::sleep(interval).await;
                if !manager.auto_save_active.load(Ordering::SeqCst) {
                    break;
                }
                let state = manager.current_state.read().await.clone();
                if state.is_null() {
                    continue;
                }
                if let Err(e) = manager.save_state(state, true).await {
                    warn!(error = %e, "auto-save failed, will retry next cycle");
                }
            }
        });
        *self.auto_save_task.lock().await = Some(handle);
        info!(
            interval_secs = self.config.auto_save_interval_secs,
            "auto-save started"
        );
    }

    /// Stop the background auto-save task.
    pub async fn stop_auto_save(&self) {
        self.auto_save_active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.auto_save_task.lock().await.take() {
            handle.abort();
        }
        info!("auto-save stopped");
    }

    /// Whether the auto-save task is running.
    pub fn auto_save_active(&self) -> bool {
        self.auto_save_active.load(Ordering::SeqCst)
    }
}

/// Hash of a state document with the save metadata removed, so the value
/// stays stable across re-saves of identical content.
fn state_content_hash(state: &serde_json::Value) -> StandorResult<String> {
    let mut value = state.clone();
    if let Some(obj) = value.as_object_mut() {
        obj.remove("saved_at");
        obj.remove("recovery");
    }
    let canonical = serde_json::to_string(&value)?;
    Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
}

async fn read_checkpoint_file(path: &Path) -> StandorResult<Checkpoint> {
    let bytes = tokio::fs::read(path).await?;
    let bytes = if path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(".gz"))
    {
        let mut decoded = Vec::new();
        GzDecoder::new(&bytes[..]).read_to_end(&mut decoded)?;
        decoded
    } else {
        bytes
    };
    Ok(serde_json::from_slice(&bytes)?)
}

async fn list_files_with_prefix(dir: &Path, prefix: &str) -> StandorResult<Vec<PathBuf>> {
    let mut matches = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(prefix))
        {
            matches.push(path);
        }
    }
    Ok(matches)
}

async fn file_modified_at(path: &Path) -> StandorResult<DateTime<Utc>> {
    let modified = tokio::fs::metadata(path).await?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
