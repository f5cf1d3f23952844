//! Retention sweeps over the cache and archive trees.
//!
//! An entry is dated by its `.created_at` sidecar when it has one, otherwise
//! by the date embedded in its name. Entries with neither are left alone.
//! Anything dated strictly before `today - keep_days` is removed, where both
//! dates are local calendar days in the configured zone.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Days, NaiveDate};
use chrono_tz::Tz;
use thiserror::Error;
use tracing::{debug, info, info_span, warn};

use crate::storage::layout::{self, InstanceLayout};

#[derive(Error, Debug)]
pub enum JanitorError {
    #[error("Failed to list '{path}': {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: Vec<PathBuf>,
    /// Entries with no recognizable date.
    pub skipped: usize,
    pub failed: usize,
}

/// First calendar day that is kept, or `None` when the window disables the sweep.
pub fn cutoff(today: NaiveDate, keep_days: u32) -> Option<NaiveDate> {
    if keep_days == 0 {
        return None;
    }
    today.checked_sub_days(Days::new(u64::from(keep_days)))
}

fn sweep<F>(root: &Path, cutoff: NaiveDate, tz: Tz, date_from_name: F) -> Result<SweepReport, JanitorError>
where
    F: Fn(&str) -> Option<NaiveDate>,
{
    let mut report = SweepReport::default();

    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} does not exist, nothing to sweep", root.display());
            return Ok(report);
        }
        Err(e) => {
            return Err(JanitorError::ReadDir {
                path: root.to_path_buf(),
                source: e,
            })
        }
    };

    for entry in entries {
        let entry = entry.map_err(|e| JanitorError::ReadDir {
            path: root.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        let sidecar_date = if is_dir {
            layout::read_sidecar(&path).map(|created| created.with_timezone(&tz).date_naive())
        } else {
            None
        };
        let Some(date) = sidecar_date.or_else(|| date_from_name(&name)) else {
            report.skipped += 1;
            continue;
        };
        if date >= cutoff {
            continue;
        }

        let removal = if is_dir {
            layout::remove_tree(&path).map_err(|e| e.to_string())
        } else {
            std::fs::remove_file(&path).map_err(|e| e.to_string())
        };
        match removal {
            Ok(()) => {
                info!("Removed expired {}", path.display());
                report.removed.push(path);
            }
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                report.failed += 1;
            }
        }
    }

    report.removed.sort();
    Ok(report)
}

/// Applies both retention windows to one instance directory.
#[derive(Debug, Clone)]
pub struct Janitor {
    layout: InstanceLayout,
    tz: Tz,
    archive_keep_days: u32,
    workdir_keep_days: u32,
}

impl Janitor {
    pub fn new(layout: InstanceLayout, tz: Tz, archive_keep_days: u32, workdir_keep_days: u32) -> Self {
        Self {
            layout,
            tz,
            archive_keep_days,
            workdir_keep_days,
        }
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Deletes archive day directories older than the archive window.
    pub fn prune_archives(&self, now: DateTime<Tz>) -> Result<SweepReport, JanitorError> {
        let _span = info_span!("janitor.prune_archives", keep_days = self.archive_keep_days).entered();
        let Some(cutoff) = cutoff(now.date_naive(), self.archive_keep_days) else {
            debug!("archive_keep_days is 0, skipped");
            return Ok(SweepReport::default());
        };
        sweep(&self.layout.archive_root(), cutoff, self.tz, layout::date_from_archive_name)
    }

    /// Deletes cache entries older than the workdir window.
    pub fn prune_workdirs(&self, now: DateTime<Tz>) -> Result<SweepReport, JanitorError> {
        let _span = info_span!("janitor.prune_workdirs", keep_days = self.workdir_keep_days).entered();
        let Some(cutoff) = cutoff(now.date_naive(), self.workdir_keep_days) else {
            debug!("workdir_keep_days is 0, skipped");
            return Ok(SweepReport::default());
        };
        sweep(&self.layout.cache_root(), cutoff, self.tz, layout::date_from_cache_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use tempfile::TempDir;

    const TZ: Tz = chrono_tz::Asia::Shanghai;

    fn now() -> DateTime<Tz> {
        TZ.with_ymd_and_hms(2026, 3, 10, 0, 30, 0).unwrap()
    }

    fn mkdir(path: &Path) {
        std::fs::create_dir_all(path).unwrap();
        std::fs::write(path.join("content.md"), "x").unwrap();
    }

    fn setup() -> (TempDir, InstanceLayout) {
        let temp = TempDir::new().unwrap();
        let layout = InstanceLayout::new(temp.path());
        (temp, layout)
    }

    #[test]
    fn test_cutoff() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        assert_eq!(cutoff(today, 0), None);
        assert_eq!(cutoff(today, 3), NaiveDate::from_ymd_opt(2026, 3, 7));
    }

    #[test]
    fn test_prune_archives_by_name() {
        let (_temp, layout) = setup();
        let root = layout.archive_root();
        for day in ["2026-03-06", "2026-03-07", "2026-03-10", "latest"] {
            mkdir(&root.join(day));
        }

        let janitor = Janitor::new(layout, TZ, 3, 3);
        let report = janitor.prune_archives(now()).unwrap();

        assert_eq!(report.removed, vec![root.join("2026-03-06")]);
        assert_eq!(report.skipped, 1);
        assert!(root.join("2026-03-07").exists());
        assert!(root.join("latest").exists());
    }

    #[test]
    fn test_prune_workdirs_by_name() {
        let (_temp, layout) = setup();
        let root = layout.cache_root();
        let old_task = root.join("taskid.a_moment.202603011200");
        let edge_task = root.join("taskid.b_moment.202603070001");
        let old_upload = root.join("uploaded.2026-02-01_Xy12");
        let stray = root.join("notes");
        for dir in [&old_task, &edge_task, &old_upload, &stray] {
            mkdir(dir);
        }
        std::fs::write(root.join("uploaded.2026-02-02-file.pdf"), "%PDF").unwrap();

        let janitor = Janitor::new(layout, TZ, 3, 3);
        let report = janitor.prune_workdirs(now()).unwrap();

        assert_eq!(report.removed.len(), 3);
        assert!(!old_task.exists());
        assert!(!old_upload.exists());
        assert!(edge_task.exists());
        assert!(stray.exists());
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn test_sidecar_wins_over_name() {
        let (_temp, layout) = setup();
        let root = layout.cache_root();
        let renamed = root.join("taskid.c_moment.202601010000");
        mkdir(&renamed);
        let recent = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 9, 8, 0, 0)
            .unwrap();
        layout::write_sidecar(&renamed, &recent).unwrap();

        let unnamed = root.join("scratch-dir");
        mkdir(&unnamed);
        let old = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 1, 1, 8, 0, 0)
            .unwrap();
        layout::write_sidecar(&unnamed, &old).unwrap();

        let janitor = Janitor::new(layout, TZ, 3, 3);
        let report = janitor.prune_workdirs(now()).unwrap();

        assert!(renamed.exists());
        assert_eq!(report.removed, vec![unnamed]);
    }

    #[test]
    fn test_sidecar_date_uses_configured_zone() {
        let (_temp, layout) = setup();
        let root = layout.archive_root();
        let dir = root.join("batch");
        mkdir(&dir);
        // 2026-03-06 20:00 UTC is already 2026-03-07 in Shanghai.
        let created = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 6, 20, 0, 0)
            .unwrap();
        layout::write_sidecar(&dir, &created).unwrap();

        let janitor = Janitor::new(layout, TZ, 3, 3);
        let report = janitor.prune_archives(now()).unwrap();
        assert!(report.removed.is_empty());
        assert!(dir.exists());
    }

    #[test]
    fn test_zero_keep_days_deletes_nothing() {
        let (_temp, layout) = setup();
        let archive = layout.archive_root().join("1999-01-01");
        let workdir = layout.cache_root().join("taskid.a_moment.199901010000");
        mkdir(&archive);
        mkdir(&workdir);

        let janitor = Janitor::new(layout, TZ, 0, 0);
        assert_eq!(janitor.prune_archives(now()).unwrap(), SweepReport::default());
        assert_eq!(janitor.prune_workdirs(now()).unwrap(), SweepReport::default());
        assert!(archive.exists());
        assert!(workdir.exists());
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let (_temp, layout) = setup();
        mkdir(&layout.archive_root().join("2026-01-01"));
        mkdir(&layout.archive_root().join("2026-03-09"));
        mkdir(&layout.cache_root().join("taskid.a_moment.202601010000"));

        let janitor = Janitor::new(layout, TZ, 3, 3);
        assert_eq!(janitor.prune_archives(now()).unwrap().removed.len(), 1);
        assert_eq!(janitor.prune_workdirs(now()).unwrap().removed.len(), 1);

        assert!(janitor.prune_archives(now()).unwrap().removed.is_empty());
        assert!(janitor.prune_workdirs(now()).unwrap().removed.is_empty());
    }

    #[test]
    fn test_missing_roots_are_empty() {
        let (_temp, layout) = setup();
        let janitor = Janitor::new(layout, TZ, 3, 3);
        assert_eq!(janitor.prune_archives(now()).unwrap(), SweepReport::default());
        assert_eq!(janitor.prune_workdirs(now()).unwrap(), SweepReport::default());
    }
}
