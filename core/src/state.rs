use std::collections::BTreeMap;
use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TaxError};

pub const STATE_UNKNOWN: &str = "unknown";
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Current state of one entity, in the shape Home Assistant's `/api/states` returns.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl EntityState {
    pub fn new(entity_id: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            state: state.into(),
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: serde_json::Value) -> Self {
        self.attributes.insert(key.to_string(), value);
        self
    }

    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(|v| v.as_str())
    }

    /// False for `unknown`, `unavailable` and empty states.
    pub fn is_available(&self) -> bool {
        let state = self.state.trim();
        !(state.is_empty()
            || state.eq_ignore_ascii_case(STATE_UNKNOWN)
            || state.eq_ignore_ascii_case(STATE_UNAVAILABLE))
    }
}

pub fn entity_domain(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(d, _)| d).unwrap_or(entity_id)
}

/// Object id part of an entity id: `zone.home` -> `home`.
pub fn object_id(entity_id: &str) -> &str {
    entity_id.split_once('.').map(|(_, o)| o).unwrap_or(entity_id)
}

/// Read access to the host's entity registry.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// `Ok(None)` when the entity does not exist.
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>>;
    /// Ids of all entities in a domain such as `person`.
    async fn list_entities(&self, domain: &str) -> Result<Vec<String>>;
}

/// State source backed by a map, filled in code or from a snapshot file.
#[derive(Debug, Default)]
pub struct MemoryStateSource {
    states: RwLock<BTreeMap<String, EntityState>>,
}

impl MemoryStateSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_states(states: impl IntoIterator<Item = EntityState>) -> Self {
        let source = Self::new();
        for state in states {
            source.set(state);
        }
        source
    }

    /// Loads a JSON array of entity states.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| TaxError::io(path, e))?;
        let states: Vec<EntityState> = serde_json::from_str(&content).map_err(|e| {
            TaxError::StateSource(format!("invalid state file {}: {}", path.display(), e))
        })?;
        Ok(Self::from_states(states))
    }

    pub fn set(&self, state: EntityState) {
        if let Ok(mut states) = self.states.write() {
            states.insert(state.entity_id.clone(), state);
        }
    }

    pub fn set_state(&self, entity_id: &str, state: &str) {
        let mut entry = self
            .states
            .read()
            .ok()
            .and_then(|s| s.get(entity_id).cloned())
            .unwrap_or_else(|| EntityState::new(entity_id, state));
        entry.state = state.to_string();
        self.set(entry);
    }

    pub fn remove(&self, entity_id: &str) {
        if let Ok(mut states) = self.states.write() {
            states.remove(entity_id);
        }
    }

    /// Replaces every state with the contents of another snapshot file.
    pub fn reload_from(&self, path: &Path) -> Result<()> {
        let fresh = Self::from_file(path)?;
        let fresh = fresh
            .states
            .into_inner()
            .map_err(|_| TaxError::StateSource("state lock poisoned".to_string()))?;
        let mut states = self
            .states
            .write()
            .map_err(|_| TaxError::StateSource("state lock poisoned".to_string()))?;
        *states = fresh;
        Ok(())
    }
}

#[async_trait]
impl StateSource for MemoryStateSource {
    async fn get_state(&self, entity_id: &str) -> Result<Option<EntityState>> {
        let states = self
            .states
            .read()
            .map_err(|_| TaxError::StateSource("state lock poisoned".to_string()))?;
        Ok(states.get(entity_id).cloned())
    }

    async fn list_entities(&self, domain: &str) -> Result<Vec<String>> {
        let states = self
            .states
            .read()
            .map_err(|_| TaxError::StateSource("state lock poisoned".to_string()))?;
        Ok(states
            .keys()
            .filter(|id| entity_domain(id) == domain)
            .cloned()
            .collect())
    }
}
