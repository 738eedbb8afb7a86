use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Runtime configuration handed to `SaccesscoAgent` by the content script.
///
/// Every field has a default, so the JSON only needs the keys that differ
/// from a local development backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Base WebSocket URL; the conversation id and a trailing slash are appended.
    pub websocket_url: String,
    pub user_prompt_url: String,
    pub page_change_url: String,
    pub conversation_id: Option<String>,
    pub debug: bool,
    pub language: String,
    /// Name shown in front of the engine's chat notices.
    pub sender_name: String,
    pub timings: EngineTimings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            websocket_url: "ws://localhost:8000/ws/saccessco/ai/".to_string(),
            user_prompt_url: "http://localhost:8000/saccessco/user_prompt/".to_string(),
            page_change_url: "http://localhost:8000/saccessco/page_change/".to_string(),
            conversation_id: None,
            debug: false,
            language: "en-US".to_string(),
            sender_name: "Saccessco".to_string(),
            timings: EngineTimings::default(),
        }
    }
}

impl AgentConfig {
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        if json.trim().is_empty() {
            return Ok(AgentConfig::default());
        }
        serde_json::from_str(json).map_err(|e| EngineError::InvalidConfig {
            details: format!("Failed to parse agent configuration: {}", e),
        })
    }

    /// `<websocket_url>/<conversation_id>/`, or the bare base URL when no
    /// conversation has been assigned yet.
    pub fn websocket_endpoint(&self) -> String {
        let mut url = self.websocket_url.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        if let Some(id) = self.conversation_id.as_deref().filter(|id| !id.is_empty()) {
            url.push_str(id);
            url.push('/');
        }
        url
    }
}

/// Waits and bounds used by the locator, executor, widget helpers and channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTimings {
    pub locator_timeout_ms: u32,
    pub poll_interval_ms: u32,
    /// Pause after scrolling a found element into view before re-checking it.
    pub scroll_settle_ms: u32,
    /// Pause between successful steps unless the step carries its own delay.
    pub step_settle_ms: u32,
    pub confirmation_timeout_ms: u32,
    pub input_timeout_ms: u32,
    pub max_reprompts: u32,
    pub date_navigation_attempts: u32,
    pub date_navigation_wait_ms: u32,
    pub location_timeout_ms: u32,
    pub reconnect_attempts: u32,
    pub reconnect_delay_ms: u32,
}

impl Default for EngineTimings {
    fn default() -> Self {
        EngineTimings {
            locator_timeout_ms: 10_000,
            poll_interval_ms: 100,
            scroll_settle_ms: 250,
            step_settle_ms: 50,
            confirmation_timeout_ms: 15_000,
            input_timeout_ms: 30_000,
            max_reprompts: 2,
            date_navigation_attempts: 36,
            date_navigation_wait_ms: 700,
            location_timeout_ms: 9_000,
            reconnect_attempts: 10,
            reconnect_delay_ms: 1_000,
        }
    }
}
