//! Last-report snapshot on disk.
//!
//! The file is a versioned JSON document, `{"version": 1, "savedAt": ...,
//! "view": ...}`. Writes go to a temporary file that is renamed into place
//! so a reader never sees a half-written report.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

use crate::dashboard::DashboardView;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    #[serde(rename = "savedAt", with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    pub view: DashboardView,
}

impl Snapshot {
    pub fn new(view: DashboardView) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: OffsetDateTime::now_utc(),
            view,
        }
    }

    /// Write atomically to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| SnapshotError::Io { path, source }
        };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(io_err(dir))?;
        }

        let data = serde_json::to_vec_pretty(self)?;
        let tmp = tmp_path(path);
        std::fs::write(&tmp, data).map_err(io_err(tmp.as_path()))?;
        std::fs::rename(&tmp, path).map_err(io_err(path))?;
        Ok(())
    }

    /// Read the snapshot at `path`.
    ///
    /// A missing file or a different format version yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        // Peek at the version first so older layouts don't fail to parse.
        let header: VersionHeader = serde_json::from_slice(&data)?;
        if header.version != SNAPSHOT_VERSION {
            return Ok(None);
        }

        Ok(Some(serde_json::from_slice(&data)?))
    }
}

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    version: u32,
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coinbase::ScriptType;
    use crate::dashboard::{build_dashboard_view, SortBy};
    use crate::scan::ScanAggregate;
    use crate::types::{
        CoinbaseRaw, Credentials, Observation, Payout, ScanTarget, JOB_WAIT_BOUND_MS,
        PING_BOUND_MS,
    };
    use tempfile::TempDir;

    fn sample_view() -> DashboardView {
        let credentials = Credentials {
            user_agent: "cgminer/4.10.0".into(),
            wallet: "12ZEw5Hcv1hTb6YUQJ69y1V7uhcoDz92PH".into(),
            worker: "rig-7".into(),
            password: "x".into(),
        };

        let good_target = ScanTarget::new("", "good.example", 3333, false);
        let mut good = Observation::failed(&good_target, &credentials, true, "");
        good.error = None;
        good.ping_ms = 38.7;
        good.job_latency_ms = 211.3;
        good.block_height = 901_936;
        good.pool_tag = "/Good/".into();
        good.payouts = vec![Payout {
            output_index: 0,
            address: credentials.wallet.clone(),
            amount_btc: 3.15012581,
            script_type: ScriptType::PubKeyHash,
        }];
        good.total_payout = 3.15012581;
        good.coinbase_raw = Some(CoinbaseRaw {
            coinbase1: "01000000".into(),
            coinbase2: "ffffffff".into(),
            full_hex: "01000000f000000f00000000ffffffff".into(),
        });
        let mut good_agg = ScanAggregate::new(good_target);
        good_agg.record(good, PING_BOUND_MS, JOB_WAIT_BOUND_MS);

        let bad_target = ScanTarget::new("", "bad.example", 443, true);
        let mut bad_agg = ScanAggregate::new(bad_target.clone());
        bad_agg.record(
            Observation::failed(&bad_target, &credentials, false, "connection refused"),
            PING_BOUND_MS,
            JOB_WAIT_BOUND_MS,
        );

        build_dashboard_view(&[good_agg, bad_agg], SortBy::Ping, 3.125)
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("last_report.json");

        let snapshot = Snapshot::new(sample_view());
        assert_eq!(snapshot.view.clean.len(), 1);
        assert_eq!(snapshot.view.issues.len(), 1);
        snapshot.save(&path).unwrap();

        assert!(!tmp_path(&path).exists());
        let loaded = Snapshot::load(&path).unwrap().unwrap();
        assert_eq!(loaded, snapshot);

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert!(raw["savedAt"].is_string());
    }

    #[test]
    fn test_missing_file_loads_nothing() {
        let dir = TempDir::new().unwrap();
        assert!(Snapshot::load(&dir.path().join("absent.json")).unwrap().is_none());
    }

    #[test]
    fn test_other_versions_are_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, r#"{"version": 2, "savedAt": "2025-06-19T14:45:28Z", "view": {"rows": []}}"#)
            .unwrap();

        assert!(Snapshot::load(&path).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(&path, "{\"version\": 1, \"view\": ").unwrap();

        assert!(matches!(
            Snapshot::load(&path),
            Err(SnapshotError::Json(_))
        ));
    }
}
