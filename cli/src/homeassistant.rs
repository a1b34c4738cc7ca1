use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use toeristenbelasting_core::state::entity_domain;
use toeristenbelasting_core::{EntityState, HomeAssistantConfig, StateSource, TaxError};
use tracing::debug;

pub const TOKEN_ENV: &str = "HOME_ASSISTANT_TOKEN";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Reads entity states from the Home Assistant REST API.
pub struct HomeAssistantStateSource {
    client: Client,
    base_url: String,
    token: String,
}

impl HomeAssistantStateSource {
    pub fn new(config: &HomeAssistantConfig) -> Result<Self> {
        let token = resolve_token(config.token.as_deref(), std::env::var(TOKEN_ENV).ok())
            .with_context(|| format!("No Home Assistant token in config or {}", TOKEN_ENV))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn state_url(&self, entity_id: &str) -> String {
        format!("{}/api/states/{}", self.base_url, entity_id)
    }

    fn states_url(&self) -> String {
        format!("{}/api/states", self.base_url)
    }
}

fn resolve_token(configured: Option<&str>, env: Option<String>) -> Option<String> {
    configured
        .map(str::to_string)
        .or(env)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn request_error(e: reqwest::Error) -> TaxError {
    TaxError::StateSource(e.to_string())
}

fn entities_in_domain(states: Vec<EntityState>, domain: &str) -> Vec<String> {
    states
        .into_iter()
        .filter(|s| entity_domain(&s.entity_id) == domain)
        .map(|s| s.entity_id)
        .collect()
}

#[async_trait]
impl StateSource for HomeAssistantStateSource {
    async fn get_state(&self, entity_id: &str) -> toeristenbelasting_core::Result<Option<EntityState>> {
        let url = self.state_url(entity_id);
        debug!(url = %url, "Fetching entity state");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(request_error)?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(TaxError::StateSource(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }
        let state = response.json::<EntityState>().await.map_err(request_error)?;
        Ok(Some(state))
    }

    async fn list_entities(&self, domain: &str) -> toeristenbelasting_core::Result<Vec<String>> {
        let response = self
            .client
            .get(self.states_url())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(request_error)?;

        if !response.status().is_success() {
            return Err(TaxError::StateSource(format!(
                "GET /api/states returned {}",
                response.status()
            )));
        }
        let states = response.json::<Vec<EntityState>>().await.map_err(request_error)?;
        Ok(entities_in_domain(states, domain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_token_wins_over_env() {
        assert_eq!(
            resolve_token(Some("abc"), Some("env".to_string())),
            Some("abc".to_string())
        );
        assert_eq!(resolve_token(None, Some(" env \n".to_string())), Some("env".to_string()));
        assert_eq!(resolve_token(Some("  "), None), None);
        assert_eq!(resolve_token(None, None), None);
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let source = HomeAssistantStateSource::new(&HomeAssistantConfig {
            url: "http://homeassistant.local:8123/".to_string(),
            token: Some("secret".to_string()),
        })
        .unwrap();

        assert_eq!(
            source.state_url("zone.home"),
            "http://homeassistant.local:8123/api/states/zone.home"
        );
        assert_eq!(source.states_url(), "http://homeassistant.local:8123/api/states");
    }

    #[test]
    fn test_entities_in_domain_parses_api_payload() {
        let payload = r#"[
            {"entity_id": "person.anna", "state": "home", "attributes": {"friendly_name": "Anna"},
             "last_changed": "2024-07-01T10:00:00+00:00"},
            {"entity_id": "zone.home", "state": "1", "attributes": {}},
            {"entity_id": "person.bram", "state": "not_home"}
        ]"#;
        let states: Vec<EntityState> = serde_json::from_str(payload).unwrap();

        assert_eq!(
            entities_in_domain(states, "person"),
            vec!["person.anna".to_string(), "person.bram".to_string()]
        );
    }
}
