use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{AppError, Result};
use crate::types::HistorySnapshot;

const SNAPSHOT_PREFIX: &str = "snapshot_";
const SNAPSHOT_SUFFIX: &str = ".json";

/// Rolling store of dated listing snapshots with an integrity-gated commit.
///
/// The snapshot set is the one piece of state that survives between runs —
/// Price Cut Velocity is meaningless without it. `stage` holds a candidate
/// invisibly; `commit` either makes the whole candidate the new latest
/// snapshot or changes nothing at all.
pub struct HistoryStore {
    dir: PathBuf,
    retention: usize,
    min_row_ratio: f64,
    snapshots: BTreeMap<NaiveDate, HistorySnapshot>,
    staged: Option<HistorySnapshot>,
}

impl HistoryStore {
    /// Open (and create if needed) the snapshot directory, loading every
    /// dated snapshot file found in it. Files that fail to parse are skipped
    /// with a warning rather than poisoning the run.
    pub fn open(dir: impl Into<PathBuf>, retention: usize, min_row_ratio: f64) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut snapshots = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let Some(date) = snapshot_date(&path) else {
                continue;
            };
            match fs::read_to_string(&path) {
                Ok(raw) => match serde_json::from_str::<HistorySnapshot>(&raw) {
                    Ok(snapshot) => {
                        snapshots.insert(date, snapshot);
                    }
                    Err(e) => warn!(path = %path.display(), "skipping unreadable snapshot: {e}"),
                },
                Err(e) => warn!(path = %path.display(), "skipping unreadable snapshot: {e}"),
            }
        }

        info!(
            loaded = snapshots.len(),
            dir = %dir.display(),
            "history store ready"
        );

        Ok(Self {
            dir,
            retention,
            min_row_ratio,
            snapshots,
            staged: None,
        })
    }

    /// Newest committed snapshot. Staged candidates are never visible here.
    pub fn latest(&self) -> Option<&HistorySnapshot> {
        self.snapshots.values().next_back()
    }

    pub fn snapshot_count(&self) -> usize {
        self.snapshots.len()
    }

    /// Hold a candidate for the next commit. Re-staging replaces the
    /// previous candidate.
    pub fn stage(&mut self, candidate: HistorySnapshot) {
        if self.staged.is_some() {
            warn!("replacing a previously staged snapshot that was never committed");
        }
        self.staged = Some(candidate);
    }

    /// Gate, persist, prune. A candidate row count below
    /// `min_row_ratio` of the previous snapshot's means a degraded ingestion
    /// run — the candidate is discarded and the previous snapshot stays
    /// authoritative. Returns the committed row count.
    pub fn commit(&mut self) -> Result<usize> {
        let candidate = self
            .staged
            .take()
            .ok_or_else(|| AppError::History("commit called with nothing staged".to_string()))?;

        let candidate_rows = candidate.len();
        if let Some(previous) = self.latest() {
            let previous_rows = previous.len();
            if (candidate_rows as f64) < (previous_rows as f64) * self.min_row_ratio {
                return Err(AppError::Integrity {
                    candidate_rows,
                    previous_rows,
                });
            }
        }

        self.write_snapshot(&candidate)?;
        self.snapshots.insert(candidate.run_date, candidate);
        self.prune();

        info!(rows = candidate_rows, "snapshot committed");
        Ok(candidate_rows)
    }

    /// Write-then-rename so a crash mid-write never leaves a half-written
    /// snapshot where `open` would find it.
    fn write_snapshot(&self, snapshot: &HistorySnapshot) -> Result<()> {
        let final_path = self.snapshot_path(snapshot.run_date);
        let tmp_path = final_path.with_extension("json.tmp");
        fs::write(&tmp_path, serde_json::to_vec_pretty(snapshot)?)?;
        fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    fn prune(&mut self) {
        while self.snapshots.len() > self.retention {
            if let Some((date, _)) = self.snapshots.pop_first() {
                let path = self.snapshot_path(date);
                if let Err(e) = fs::remove_file(&path) {
                    warn!(path = %path.display(), "failed to remove pruned snapshot: {e}");
                }
                info!(date = %date, "pruned oldest snapshot");
            }
        }
    }

    fn snapshot_path(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{SNAPSHOT_PREFIX}{date}{SNAPSHOT_SUFFIX}"))
    }
}

/// `snapshot_2026-08-01.json` → the date; anything else → None.
fn snapshot_date(path: &Path) -> Option<NaiveDate> {
    let name = path.file_name()?.to_str()?;
    let stem = name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_SUFFIX)?;
    NaiveDate::parse_from_str(stem, "%Y-%m-%d").ok()
}
