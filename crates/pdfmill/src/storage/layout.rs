//! On-disk layout of an instance directory.
//!
//! ```text
//! <instance>/
//!   cache/taskid.<uuid>_moment.<YYYYMMDDHHmm>/     per-job working directory
//!   cache/uploaded.<YYYY-MM-DD>_<random>/          intake uploads (created elsewhere)
//!   archives/<YYYY-MM-DD>/<workdir name>.zip       packed results
//! ```
//!
//! Every directory created here carries a `.created_at` sidecar with its
//! RFC 3339 creation time, which the janitor prefers over the name.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;

use crate::error::StorageError;

pub const CACHE_DIR: &str = "cache";
pub const ARCHIVES_DIR: &str = "archives";
pub const ARCHIVE_EXTENSION: &str = "zip";
pub const SIDECAR_FILE: &str = ".created_at";

static RE_UPLOADED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^uploaded\.(\d{4}-\d{2}-\d{2})").unwrap());
static RE_MOMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^taskid\..*moment\.(\d{12})").unwrap());

/// Name of the working directory for one run of a task.
pub fn workdir_name(uuid: &str, moment: &DateTime<FixedOffset>) -> String {
    format!("taskid.{}_moment.{}", uuid, moment.format("%Y%m%d%H%M"))
}

/// Date of an archive day directory named `YYYY-MM-DD`.
pub fn date_from_archive_name(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// Date embedded in a cache entry name: `uploaded.<YYYY-MM-DD>...` or
/// `taskid.<uuid>_moment.<YYYYMMDDHHmm>`.
pub fn date_from_cache_name(name: &str) -> Option<NaiveDate> {
    if let Some(caps) = RE_UPLOADED.captures(name) {
        return NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok();
    }
    let caps = RE_MOMENT.captures(name)?;
    NaiveDateTime::parse_from_str(&caps[1], "%Y%m%d%H%M")
        .ok()
        .map(|moment| moment.date())
}

pub fn write_sidecar(dir: &Path, created_at: &DateTime<FixedOffset>) -> Result<(), StorageError> {
    let path = dir.join(SIDECAR_FILE);
    std::fs::write(&path, created_at.to_rfc3339()).map_err(|e| StorageError::WriteFile {
        path,
        source: e,
    })
}

/// Reads a directory's creation time from its sidecar, if one is present and valid.
pub fn read_sidecar(dir: &Path) -> Option<DateTime<FixedOffset>> {
    let raw = std::fs::read_to_string(dir.join(SIDECAR_FILE)).ok()?;
    DateTime::parse_from_rfc3339(raw.trim()).ok()
}

fn ensure_directory(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::CreateDirectory {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Removes a directory tree, treating an already-missing tree as removed.
pub fn remove_tree(path: &Path) -> Result<(), StorageError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::RemoveDirectory {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Resolves the cache and archive roots of one instance directory.
#[derive(Debug, Clone)]
pub struct InstanceLayout {
    root: PathBuf,
}

impl InstanceLayout {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.root.join(CACHE_DIR)
    }

    pub fn archive_root(&self) -> PathBuf {
        self.root.join(ARCHIVES_DIR)
    }

    pub fn archive_day_dir(&self, date: NaiveDate) -> PathBuf {
        self.archive_root().join(date.format("%Y-%m-%d").to_string())
    }

    /// Creates a fresh working directory, discarding leftovers from an
    /// interrupted earlier run with the same name.
    pub fn prepare_workdir(
        &self,
        name: &str,
        created_at: &DateTime<FixedOffset>,
    ) -> Result<PathBuf, StorageError> {
        let dir = self.cache_root().join(name);
        remove_tree(&dir)?;
        ensure_directory(&dir)?;
        write_sidecar(&dir, created_at)?;
        Ok(dir)
    }

    /// Path of the archive for `folder`, creating its day directory on demand.
    pub fn prepare_archive_path(
        &self,
        folder: &str,
        created_at: &DateTime<FixedOffset>,
    ) -> Result<PathBuf, StorageError> {
        let day_dir = self.archive_day_dir(created_at.date_naive());
        if !day_dir.join(SIDECAR_FILE).exists() {
            ensure_directory(&day_dir)?;
            write_sidecar(&day_dir, created_at)?;
        }
        Ok(day_dir.join(format!("{}.{}", folder, ARCHIVE_EXTENSION)))
    }

    /// `path` relative to the instance root with `/` separators, as stored in
    /// `tarball_location`.
    pub fn relative_location(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    pub fn resolve_location(&self, location: &str) -> PathBuf {
        self.root.join(location)
    }
}
