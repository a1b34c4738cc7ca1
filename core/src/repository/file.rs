use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;

use crate::config::default_data_dir;
use crate::error::{Result, TaxError};
use crate::model::ledger::LedgerSnapshot;
use crate::repository::traits::LedgerRepository;

pub const DEFAULT_FILE_NAME: &str = "toeristenbelasting.json";

#[derive(Clone, Debug)]
pub struct FileLedgerRepository {
    file_path: PathBuf,
}

impl FileLedgerRepository {
    /// Repository for `<base_dir>/toeristenbelasting.json`, defaulting to `~/.toeristenbelasting`.
    pub fn new(base_dir: Option<PathBuf>) -> Result<Self> {
        let dir = match base_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };
        fs::create_dir_all(&dir).map_err(|e| TaxError::io(&dir, e))?;
        Ok(Self::at(dir.join(DEFAULT_FILE_NAME)))
    }

    /// Repository for an explicit file path. Nothing is created until the first save.
    pub fn at(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.file_path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// `<file>.<pid>.tmp`, so writers in different processes never share a temp file.
    fn temp_path(&self) -> PathBuf {
        self.sibling(&format!(".{}.tmp", std::process::id()))
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn ensure_parent(&self) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TaxError::io(parent, e))?;
            }
        }
        Ok(())
    }

    /// Runs `f` while holding an exclusive advisory lock on `<file>.lock`.
    /// Blocks until other holders, in this process or another, release it.
    fn with_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.ensure_parent()?;
        let lock_path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| TaxError::io(&lock_path, e))?;
        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock.write().map_err(|e| TaxError::io(&lock_path, e))?;
        f()
    }

    fn read_snapshot(&self) -> Result<Option<LedgerSnapshot>> {
        let file = match File::open(&self.file_path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaxError::io(&self.file_path, e)),
        };
        let reader = BufReader::new(file);
        let snapshot = serde_json::from_reader(reader).map_err(|source| {
            if source.is_io() {
                TaxError::io(&self.file_path, source.into())
            } else {
                TaxError::Corrupt {
                    path: self.file_path.clone(),
                    source,
                }
            }
        })?;
        Ok(Some(snapshot))
    }

    /// Callers hold the lock.
    fn write_snapshot(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.ensure_parent()?;
        write_json_atomic(&self.file_path, &self.temp_path(), snapshot)
    }
}

/// Writes `value` to `tmp_path`, syncs it, then renames it over `path`.
/// On failure the temp file is removed and `path` is left as it was.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, tmp_path: &Path, value: &T) -> Result<()> {
    let result = (|| -> Result<()> {
        let file = File::create(tmp_path).map_err(|e| TaxError::io(tmp_path, e))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, value)?;
        writer.flush().map_err(|e| TaxError::io(tmp_path, e))?;
        let file = writer
            .into_inner()
            .map_err(|e| TaxError::io(tmp_path, e.into_error()))?;
        file.sync_all().map_err(|e| TaxError::io(tmp_path, e))?;
        fs::rename(tmp_path, path).map_err(|e| TaxError::io(path, e))
    })();

    if result.is_err() {
        let _ = fs::remove_file(tmp_path);
    }
    result
}

impl LedgerRepository for FileLedgerRepository {
    fn load(&self) -> Result<LedgerSnapshot> {
        Ok(self.read_snapshot()?.unwrap_or_default())
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<()> {
        self.with_lock(|| self.write_snapshot(snapshot))
    }

    fn modify<F>(&self, apply: F) -> Result<LedgerSnapshot>
    where
        F: FnOnce(Option<LedgerSnapshot>) -> LedgerSnapshot,
    {
        self.with_lock(|| {
            let stored = match self.read_snapshot() {
                Ok(snapshot) => Some(snapshot.unwrap_or_default()),
                Err(e @ TaxError::Corrupt { .. }) => {
                    warn!(error = %e, "Stored ledger unreadable, it will be replaced");
                    None
                }
                Err(e) => return Err(e),
            };
            let next = apply(stored);
            self.write_snapshot(&next)?;
            Ok(next)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::day_record::DayRecord;
    use crate::model::ledger::{Ledger, TotalPolicy};
    use chrono::{Local, NaiveDate};
    use tempfile::TempDir;

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::default();
        for d in 1..=3 {
            let date = NaiveDate::from_ymd_opt(2024, 7, d).unwrap();
            ledger.upsert(DayRecord::new(date, d, 1, 2.40));
        }
        ledger.touch(Local::now());
        ledger
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let repo = FileLedgerRepository::new(Some(dir.path().to_path_buf())).unwrap();

        let snapshot = repo.load().unwrap();
        assert!(snapshot.days.is_empty());
        assert_eq!(snapshot.total, 0.0);
        assert!(!repo.path().exists());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let repo = FileLedgerRepository::new(Some(dir.path().to_path_buf())).unwrap();
        let ledger = sample_ledger();

        repo.save(&ledger.to_snapshot()).unwrap();
        let loaded = Ledger::from_snapshot(repo.load().unwrap(), TotalPolicy::All);

        assert_eq!(loaded.days(), ledger.days());
        assert_eq!(loaded.total(), ledger.total());
        assert!(!repo.temp_path().exists());
    }

    #[test]
    fn test_malformed_file_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "{\"days\": [1, 2").unwrap();

        let err = FileLedgerRepository::at(&path).load().unwrap_err();
        assert!(matches!(err, TaxError::Corrupt { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_schema_violation_is_reported_as_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, r#"{"days": {"not-a-date": {}}, "total": 1}"#).unwrap();

        let err = FileLedgerRepository::at(&path).load().unwrap_err();
        assert!(matches!(err, TaxError::Corrupt { .. }));
    }

    #[test]
    fn test_failed_save_keeps_previous_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let repo = FileLedgerRepository::at(&path);
        repo.save(&sample_ledger().to_snapshot()).unwrap();
        let before = fs::read(&path).unwrap();

        // A directory squatting on the temp path makes the write fail before the rename.
        fs::create_dir(repo.temp_path()).unwrap();
        let mut emptied = sample_ledger();
        emptied.clear();
        assert!(repo.save(&emptied.to_snapshot()).is_err());

        let after = fs::read(&path).unwrap();
        assert_eq!(before, after);
        assert!(!after.is_empty());
    }

    #[test]
    fn test_leftover_temp_file_is_replaced() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let repo = FileLedgerRepository::at(&path);
        fs::write(repo.temp_path(), b"partial garbage").unwrap();

        repo.save(&sample_ledger().to_snapshot()).unwrap();

        assert!(!repo.temp_path().exists());
        assert_eq!(repo.load().unwrap().days.len(), 3);
    }

    #[test]
    fn test_modify_sees_writes_from_other_handles() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        let daemon = FileLedgerRepository::at(&path);
        let cli = FileLedgerRepository::at(&path);
        daemon.save(&sample_ledger().to_snapshot()).unwrap();

        cli.save(&LedgerSnapshot::default()).unwrap();
        let after = daemon
            .modify(|stored| {
                let stored = stored.unwrap();
                assert!(stored.days.is_empty());
                stored
            })
            .unwrap();
        assert!(after.days.is_empty());
        assert!(daemon.load().unwrap().days.is_empty());
    }

    #[test]
    fn test_modify_on_corrupt_file_gets_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");
        fs::write(&path, "not json").unwrap();
        let repo = FileLedgerRepository::at(&path);

        repo.modify(|stored| {
            assert!(stored.is_none());
            sample_ledger().to_snapshot()
        })
        .unwrap();
        assert_eq!(repo.load().unwrap().days.len(), 3);
    }

    #[test]
    fn test_concurrent_modify_loses_no_update() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ledger.json");

        let handles: Vec<_> = (1..=8u32)
            .map(|d| {
                let repo = FileLedgerRepository::at(&path);
                std::thread::spawn(move || {
                    repo.modify(|stored| {
                        let mut ledger =
                            Ledger::from_snapshot(stored.unwrap_or_default(), TotalPolicy::All);
                        let date = NaiveDate::from_ymd_opt(2024, 8, d).unwrap();
                        ledger.upsert(DayRecord::new(date, 1, 0, 2.40));
                        ledger.to_snapshot()
                    })
                    .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let stored = FileLedgerRepository::at(&path).load().unwrap();
        assert_eq!(stored.days.len(), 8);
        assert_eq!(stored.total, 19.20);
    }

    #[test]
    fn test_save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deep").join("ledger.json");
        let repo = FileLedgerRepository::at(&path);

        repo.save(&sample_ledger().to_snapshot()).unwrap();
        assert!(path.exists());
    }
}
