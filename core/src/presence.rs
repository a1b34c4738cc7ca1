use tracing::{debug, warn};

use crate::error::Result;
use crate::state::{object_id, StateSource};

pub const PERSON_DOMAIN: &str = "person";

/// Names a tracked entity's state may carry when it is inside `zone_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneMatcher {
    names: Vec<String>,
}

impl ZoneMatcher {
    pub async fn resolve(source: &dyn StateSource, zone_id: &str) -> Result<Self> {
        let mut names = vec![object_id(zone_id).to_string()];
        match source.get_state(zone_id).await? {
            Some(zone) => {
                if let Some(name) = zone.friendly_name() {
                    names.push(name.to_string());
                }
            }
            None => debug!(zone = zone_id, "Zone entity not found, matching on its object id only"),
        }
        Ok(Self { names })
    }

    pub fn matches(&self, state: &str) -> bool {
        let state = state.trim();
        self.names.iter().any(|n| n.eq_ignore_ascii_case(state))
    }
}

/// Counts the tracked entities currently in `zone_id`.
/// With no tracked entities configured every `person.*` entity is checked.
pub async fn count_persons_in_zone(
    source: &dyn StateSource,
    zone_id: &str,
    tracked: &[String],
) -> Result<u32> {
    let matcher = ZoneMatcher::resolve(source, zone_id).await?;
    let entities = if tracked.is_empty() {
        source.list_entities(PERSON_DOMAIN).await?
    } else {
        tracked.to_vec()
    };

    let mut count = 0;
    for entity_id in &entities {
        match source.get_state(entity_id).await? {
            Some(entity) if matcher.matches(&entity.state) => count += 1,
            Some(_) => {}
            None => warn!(entity = %entity_id, "Tracked entity not found"),
        }
    }
    debug!(zone = zone_id, count, checked = entities.len(), "Counted persons in zone");
    Ok(count)
}

/// Interprets a numeric input state as a head count.
/// Unknown, unavailable, non-numeric and negative values count as zero.
pub fn parse_guest_count(state: &str) -> u32 {
    match state.trim().parse::<f64>() {
        Ok(value) if value.is_finite() && value > 0.0 => value.round().min(u32::MAX as f64) as u32,
        _ => 0,
    }
}

/// Reads the guest input; a missing entity or no configured entity means zero guests.
pub async fn read_guests(source: &dyn StateSource, guest_entity: Option<&str>) -> Result<u32> {
    let Some(entity_id) = guest_entity else {
        return Ok(0);
    };
    let guests = match source.get_state(entity_id).await? {
        Some(entity) => {
            let guests = parse_guest_count(&entity.state);
            if guests == 0 && !entity.is_available() {
                debug!(entity = entity_id, state = %entity.state, "Guest input not available, using 0");
            }
            guests
        }
        None => {
            warn!(entity = entity_id, "Guest input entity not found, using 0");
            0
        }
    };
    Ok(guests)
}
