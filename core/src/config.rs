use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaxError};
use crate::model::ledger::TotalPolicy;
use crate::time::{parse_time_of_day, DEFAULT_UPDATE_TIME};

pub const CONFIG_FILE_NAME: &str = "config.json";
pub const DEFAULT_PRICE_PER_PERSON: f64 = 2.40;
pub const DEFAULT_HOME_ZONE: &str = "zone.home";
pub const DEFAULT_GUEST_ENTITY: &str = "input_number.toeristenbelasting_gasten";
pub const DEFAULT_TIME_POLL_INTERVAL_SECS: u64 = 300;

/// `~/.toeristenbelasting`
pub fn default_data_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| TaxError::Config("Could not determine home directory".to_string()))?;
    Ok(home_dir.join(".toeristenbelasting"))
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HomeAssistantConfig {
    pub url: String,
    /// Long-lived access token. Falls back to `HOME_ASSISTANT_TOKEN` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TaxConfig {
    pub price_per_person: f64,
    pub home_zone: String,
    /// Entities whose state is compared against the zone. Empty means every `person.*`.
    pub tracked_entities: Vec<String>,
    pub guest_entity: Option<String>,
    pub update_time: String,
    /// `input_datetime` entity that overrides `update_time`.
    pub update_time_entity: Option<String>,
    pub time_poll_interval_secs: u64,
    pub total_policy: TotalPolicy,
    pub data_file: Option<PathBuf>,
    pub home_assistant: Option<HomeAssistantConfig>,
    /// JSON snapshot of entity states, used instead of Home Assistant.
    pub state_file: Option<PathBuf>,
}

impl Default for TaxConfig {
    fn default() -> Self {
        Self {
            price_per_person: DEFAULT_PRICE_PER_PERSON,
            home_zone: DEFAULT_HOME_ZONE.to_string(),
            tracked_entities: Vec::new(),
            guest_entity: Some(DEFAULT_GUEST_ENTITY.to_string()),
            update_time: DEFAULT_UPDATE_TIME.to_string(),
            update_time_entity: None,
            time_poll_interval_secs: DEFAULT_TIME_POLL_INTERVAL_SECS,
            total_policy: TotalPolicy::default(),
            data_file: None,
            home_assistant: None,
            state_file: None,
        }
    }
}

impl TaxConfig {
    /// Reads the config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let config: TaxConfig = match fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| TaxError::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == ErrorKind::NotFound => TaxConfig::default(),
            Err(e) => return Err(TaxError::io(path, e)),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TaxError::io(parent, e))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| TaxError::io(path, e))
    }

    pub fn validate(&self) -> Result<()> {
        if !self.price_per_person.is_finite() || self.price_per_person <= 0.0 {
            return Err(TaxError::Config(format!(
                "price_per_person must be positive, got {}",
                self.price_per_person
            )));
        }
        if self.home_zone.trim().is_empty() {
            return Err(TaxError::Config("home_zone must not be empty".to_string()));
        }
        if self.time_poll_interval_secs == 0 {
            return Err(TaxError::Config(
                "time_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        parse_time_of_day(&self.update_time)?;
        Ok(())
    }

    /// The configured fallback time of day.
    pub fn default_update_time(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.update_time)
    }

    pub fn ledger_path(&self, data_dir: &Path) -> PathBuf {
        self.data_file
            .clone()
            .unwrap_or_else(|| data_dir.join(crate::repository::file::DEFAULT_FILE_NAME))
    }

    /// Published schedule status, next to the ledger.
    pub fn status_path(&self, data_dir: &Path) -> PathBuf {
        self.ledger_path(data_dir)
            .with_file_name(crate::repository::status::STATUS_FILE_NAME)
    }
}
