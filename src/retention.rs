//! Retention: age-based eviction of checkpoint history
//!
//! A prune pass computes `cutoff = now - max_age`, deletes every checkpoint
//! file whose embedded timestamp is older, then removes the folders those
//! deletions left empty (deepest first). Files without a parseable
//! timestamp are never touched.
//!
//! Running a pass twice without new writes in between deletes nothing the
//! second time.

use crate::backend::{join, Backend, SEPARATOR};
use crate::metadata::{timestamp_from_file_name, EXT};
use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Unit of the retention horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    /// Seconds
    Second,
    /// Minutes
    Minute,
    /// Hours
    Hour,
    /// Days
    #[default]
    Day,
    /// Weeks
    Week,
}

impl TimeUnit {
    /// Every unit, shortest first
    pub const ALL: [Self; 5] = [Self::Second, Self::Minute, Self::Hour, Self::Day, Self::Week];

    /// Get unit name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
        }
    }

    /// `value` of this unit as a duration, saturating on overflow
    #[must_use]
    pub fn duration(&self, value: u64) -> Duration {
        let value = i64::try_from(value).unwrap_or(i64::MAX);
        let seconds = match self {
            Self::Second => Some(value),
            Self::Minute => value.checked_mul(60),
            Self::Hour => value.checked_mul(3_600),
            Self::Day => value.checked_mul(86_400),
            Self::Week => value.checked_mul(604_800),
        };
        seconds
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX)
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|unit| unit.as_str() == lower)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "unknown time unit '{s}', expected one of second, minute, hour, day, week"
                ))
            })
    }
}

/// Instant `value * unit` before now.
#[must_use]
pub fn duration_ago(value: u64, unit: TimeUnit) -> DateTime<Utc> {
    Utc::now()
        .checked_sub_signed(unit.duration(value))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Maximum age of checkpoint history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    value: u64,
    unit: TimeUnit,
}

impl RetentionPolicy {
    /// Keep history for `value` units
    #[must_use]
    pub const fn new(value: u64, unit: TimeUnit) -> Self {
        Self { value, unit }
    }

    /// Horizon length
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.value
    }

    /// Horizon unit
    #[must_use]
    pub const fn unit(&self) -> TimeUnit {
        self.unit
    }

    /// Maximum age as a duration
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.unit.duration(self.value)
    }

    /// Entries strictly older than this instant are expired
    #[must_use]
    pub fn cutoff(&self) -> DateTime<Utc> {
        duration_ago(self.value, self.unit)
    }
}

/// What a prune pass covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneScope<'a> {
    /// Every folder under the output base path
    All,
    /// One checkpoint folder; removed itself once emptied
    Function(&'a str),
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Metadata records and artifacts deleted
    pub deleted_files: usize,
    /// Folders removed because the pass emptied them
    pub removed_folders: usize,
}

/// Applies a [`RetentionPolicy`] to a storage location.
#[derive(Clone)]
pub struct RetentionManager {
    backend: Arc<dyn Backend>,
    base_path: String,
    policy: RetentionPolicy,
}

impl std::fmt::Debug for RetentionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetentionManager")
            .field("backend", &self.backend.name())
            .field("base_path", &self.base_path)
            .field("policy", &self.policy)
            .finish()
    }
}

fn normalize(path: &str) -> &str {
    path.trim_start_matches(SEPARATOR).trim_end_matches(SEPARATOR)
}

fn parent(path: &str) -> Option<&str> {
    path.trim_end_matches(SEPARATOR)
        .rsplit_once(SEPARATOR)
        .map(|(parent, _)| parent)
}

impl RetentionManager {
    /// Create a manager for `base_path`
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, base_path: impl Into<String>, policy: RetentionPolicy) -> Self {
        Self {
            backend,
            base_path: base_path.into(),
            policy,
        }
    }

    /// Configured policy
    #[must_use]
    pub const fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// Delete expired checkpoint files in `scope`.
    ///
    /// # Errors
    /// Returns error if listing or deleting fails for a reason other than
    /// the entry having already disappeared
    pub fn prune(&self, scope: PruneScope<'_>) -> Result<PruneReport> {
        let target = match scope {
            PruneScope::All => self.base_path.clone(),
            PruneScope::Function(folder) => join(&self.base_path, folder),
        };
        let mut report = PruneReport::default();
        if !self.backend.exists(&target)? {
            return Ok(report);
        }

        let cutoff = self.policy.cutoff();
        let root = normalize(&target);
        let mut touched = BTreeSet::new();

        for entry in self.backend.list(&target, true)? {
            let name = entry.rsplit(['/', '\\']).next().unwrap_or_default();
            if !name.contains(EXT) || self.backend.is_directory(&entry)? {
                continue;
            }
            let timestamp = match timestamp_from_file_name(&entry) {
                Ok(timestamp) => timestamp,
                Err(e) => {
                    warn!(path = %entry, error = %e, "Skipping checkpoint file without timestamp");
                    continue;
                }
            };
            if timestamp >= cutoff {
                continue;
            }
            match self.backend.delete(&entry) {
                Ok(()) => report.deleted_files += 1,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
            debug!(path = %entry, %timestamp, %cutoff, "Pruned expired checkpoint file");

            let mut folder = parent(&entry);
            while let Some(dir) = folder {
                if normalize(dir).len() <= root.len() {
                    break;
                }
                touched.insert(dir.to_string());
                folder = parent(dir);
            }
        }

        if report.deleted_files == 0 {
            return Ok(report);
        }

        let mut folders: Vec<String> = touched.into_iter().collect();
        folders.sort_by_key(|f| std::cmp::Reverse(f.matches(SEPARATOR).count()));
        if matches!(scope, PruneScope::Function(_)) {
            folders.push(target.clone());
        }
        for folder in folders {
            if self.remove_if_empty(&folder)? {
                report.removed_folders += 1;
                debug!(path = %folder, "Removed empty checkpoint folder");
            }
        }
        Ok(report)
    }

    fn remove_if_empty(&self, folder: &str) -> Result<bool> {
        let entries = match self.backend.list(folder, false) {
            Ok(entries) => entries,
            Err(e) if e.is_not_found() => return Ok(false),
            Err(e) => return Err(e),
        };
        if !entries.is_empty() {
            return Ok(false);
        }
        match self.backend.delete(folder) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}
