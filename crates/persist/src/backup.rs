// Durable design file with timestamped backup rotation.
//
// Layout under the data directory:
//   <file>                               current durable copy
//   backups/<stem>-<YYYYMMDDTHHMMSSfffZ>.json
//
// Same-millisecond collisions get a `-N` suffix; rotation orders by
// (timestamp, N) parsed from the name, not by raw byte order.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::{debug, info, warn};

const BACKUP_DIR: &str = "backups";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%3fZ";

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("failed to create {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to back up {path}: {source}")]
    Backup { path: PathBuf, source: io::Error },

    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    /// File name of the backup taken of the previous copy, if there was one.
    pub backup_file: Option<String>,
    pub pruned: usize,
}

#[derive(Debug, Clone)]
pub struct DesignFile {
    data_dir: PathBuf,
    file_name: String,
    max_backups: usize,
}

impl DesignFile {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        file_name: impl Into<String>,
        max_backups: usize,
    ) -> Self {
        Self { data_dir: data_dir.into(), file_name: file_name.into(), max_backups }
    }

    pub fn path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join(BACKUP_DIR)
    }

    fn stem(&self) -> &str {
        Path::new(&self.file_name).file_stem().and_then(|s| s.to_str()).unwrap_or("design")
    }

    /// Current durable copy, or `None` before the first save.
    pub fn read(&self) -> io::Result<Option<String>> {
        match fs::read_to_string(self.path()) {
            Ok(contents) => Ok(Some(contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Back up the current copy, atomically replace it, then rotate.
    ///
    /// Callers serialize saves; two concurrent calls may race on the
    /// temp file.
    pub fn save(&self, contents: &str, now: DateTime<Utc>) -> Result<SaveOutcome, BackupError> {
        let backups = self.backups_dir();
        fs::create_dir_all(&backups)
            .map_err(|source| BackupError::CreateDir { path: backups.clone(), source })?;

        let target = self.path();
        let backup_file = if target.exists() {
            let name = self.unused_backup_name(now);
            let backup_path = backups.join(&name);
            fs::copy(&target, &backup_path)
                .map_err(|source| BackupError::Backup { path: backup_path.clone(), source })?;
            debug!(backup = %name, "previous copy backed up");
            Some(name)
        } else {
            None
        };

        let tmp = self.data_dir.join(format!(".{}.tmp", self.file_name));
        fs::write(&tmp, contents)
            .map_err(|source| BackupError::Write { path: tmp.clone(), source })?;
        fs::rename(&tmp, &target)
            .map_err(|source| BackupError::Write { path: target.clone(), source })?;

        let pruned = self.rotate();
        info!(
            path = %target.display(),
            bytes = contents.len(),
            backup = backup_file.as_deref().unwrap_or("-"),
            pruned,
            "design saved"
        );
        Ok(SaveOutcome { backup_file, pruned })
    }

    /// Backup names, oldest first.
    pub fn list_backups(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.backups_dir()) else {
            return Vec::new();
        };
        let prefix = format!("{}-", self.stem());
        let mut names: Vec<(String, u32, String)> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                let (stamp, n) = backup_order_key(&name, &prefix)?;
                Some((stamp.to_string(), n, name))
            })
            .collect();
        names.sort();
        names.into_iter().map(|(_, _, name)| name).collect()
    }

    /// Delete the oldest backups beyond `max_backups`. Returns how many went.
    fn rotate(&self) -> usize {
        let names = self.list_backups();
        let excess = names.len().saturating_sub(self.max_backups);
        let dir = self.backups_dir();
        let mut pruned = 0;
        for name in names.iter().take(excess) {
            match fs::remove_file(dir.join(name)) {
                Ok(()) => pruned += 1,
                Err(error) => warn!(backup = %name, %error, "failed to prune backup"),
            }
        }
        pruned
    }

    /// Next free name for `now`. The counter only grows, even after
    /// rotation removed earlier backups from the same millisecond.
    fn unused_backup_name(&self, now: DateTime<Utc>) -> String {
        let stamp = now.format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let prefix = format!("{}-", self.stem());
        let highest = self
            .list_backups()
            .iter()
            .filter_map(|name| backup_order_key(name, &prefix))
            .filter(|(existing, _)| *existing == stamp)
            .map(|(_, n)| n)
            .max();
        match highest {
            None => format!("{prefix}{stamp}.json"),
            Some(n) => format!("{prefix}{stamp}-{}.json", n + 1),
        }
    }
}

/// `<prefix><timestamp>[-N].json` as `(timestamp, N)`; the unsuffixed name is N = 0.
fn backup_order_key<'a>(name: &'a str, prefix: &str) -> Option<(&'a str, u32)> {
    let rest = name.strip_prefix(prefix)?.strip_suffix(".json")?;
    let (stamp, n) = match rest.split_once('-') {
        Some((stamp, n)) => (stamp, n.parse().ok()?),
        None => (rest, 0),
    };
    NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    Some((stamp, n))
}
