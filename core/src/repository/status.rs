use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{Result, TaxError};
use crate::repository::file::write_json_atomic;
use crate::scheduler::ScheduleStatus;

pub const STATUS_FILE_NAME: &str = "toeristenbelasting.status.json";

/// Schedule status published by the running daemon for other processes to read.
#[derive(Clone, Debug)]
pub struct ScheduleStatusFile {
    file_path: PathBuf,
}

impl ScheduleStatusFile {
    pub fn at(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    /// `None` when no daemon has published anything yet.
    pub fn load(&self) -> Result<Option<ScheduleStatus>> {
        let content = match fs::read_to_string(&self.file_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(TaxError::io(&self.file_path, e)),
        };
        let status = serde_json::from_str(&content).map_err(|source| TaxError::Corrupt {
            path: self.file_path.clone(),
            source,
        })?;
        Ok(Some(status))
    }

    pub fn save(&self, status: &ScheduleStatus) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| TaxError::io(parent, e))?;
            }
        }
        let mut tmp = self.file_path.as_os_str().to_owned();
        tmp.push(format!(".{}.tmp", std::process::id()));
        write_json_atomic(&self.file_path, Path::new(&tmp), status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveTime, TimeZone};
    use tempfile::TempDir;

    #[test]
    fn test_missing_status_file() {
        let dir = TempDir::new().unwrap();
        let file = ScheduleStatusFile::at(dir.path().join(STATUS_FILE_NAME));
        assert_eq!(file.load().unwrap(), None);
    }

    #[test]
    fn test_published_status_is_read_back() {
        let dir = TempDir::new().unwrap();
        let file = ScheduleStatusFile::at(dir.path().join(STATUS_FILE_NAME));
        let status = ScheduleStatus::Scheduled {
            update_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            next_run: Local.with_ymd_and_hms(2024, 7, 1, 23, 0, 0).earliest().unwrap(),
        };

        file.save(&status).unwrap();
        assert_eq!(file.load().unwrap(), Some(status));

        file.save(&ScheduleStatus::NotScheduled).unwrap();
        assert_eq!(file.load().unwrap(), Some(ScheduleStatus::NotScheduled));
    }
}
