use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use toeristenbelasting_core::{MemoryStateSource, StateSource, TaxConfig};
use tracing::info;

use crate::homeassistant::HomeAssistantStateSource;

/// Where entity states come from.
pub enum StateBackend {
    HomeAssistant(Arc<HomeAssistantStateSource>),
    /// JSON snapshot file, re-read on reload.
    Snapshot {
        source: Arc<MemoryStateSource>,
        path: PathBuf,
    },
    /// No states at all; enough for commands that only read the ledger.
    Empty(Arc<MemoryStateSource>),
}

impl StateBackend {
    pub fn from_config(config: &TaxConfig) -> Result<Self> {
        if let Some(ha) = &config.home_assistant {
            info!(url = %ha.url, "Using Home Assistant state source");
            return Ok(StateBackend::HomeAssistant(Arc::new(HomeAssistantStateSource::new(ha)?)));
        }
        if let Some(path) = &config.state_file {
            info!(path = %path.display(), "Using state snapshot file");
            let source = MemoryStateSource::from_file(path)
                .with_context(|| format!("Failed to read state file {}", path.display()))?;
            return Ok(StateBackend::Snapshot {
                source: Arc::new(source),
                path: path.clone(),
            });
        }
        bail!("Configure either home_assistant or state_file to read entity states")
    }

    pub fn empty() -> Self {
        StateBackend::Empty(Arc::new(MemoryStateSource::new()))
    }

    pub fn source(&self) -> Arc<dyn StateSource> {
        match self {
            StateBackend::HomeAssistant(source) => Arc::clone(source) as Arc<dyn StateSource>,
            StateBackend::Snapshot { source, .. } => Arc::clone(source) as Arc<dyn StateSource>,
            StateBackend::Empty(source) => Arc::clone(source) as Arc<dyn StateSource>,
        }
    }

    /// Re-reads the snapshot file. Live sources need no refresh.
    pub fn refresh(&self) -> Result<()> {
        if let StateBackend::Snapshot { source, path } = self {
            source
                .reload_from(path)
                .with_context(|| format!("Failed to reload state file {}", path.display()))?;
            info!(path = %path.display(), "State snapshot reloaded");
        }
        Ok(())
    }
}
