use reqwest::Client;
use serde_json::{json, Value};
use web_sys::console;

use crate::config::AgentConfig;
use crate::error::EngineError;

/// Posts user prompts and page snapshots to the assistant backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    user_prompt_url: String,
    page_change_url: String,
    conversation_id: Option<String>,
}

pub fn user_prompt_payload(conversation_id: Option<&str>, prompt: &str) -> Value {
    json!({ "conversation_id": conversation_id, "prompt": prompt })
}

pub fn page_change_payload(conversation_id: Option<&str>, html: &str) -> Value {
    json!({ "conversation_id": conversation_id, "html": html })
}

impl BackendClient {
    pub fn new(config: &AgentConfig) -> Self {
        BackendClient {
            client: Client::new(),
            user_prompt_url: config.user_prompt_url.clone(),
            page_change_url: config.page_change_url.clone(),
            conversation_id: config.conversation_id.clone(),
        }
    }

    pub async fn send_user_prompt(&self, prompt: &str) -> Result<Value, EngineError> {
        if prompt.trim().is_empty() {
            return Err(EngineError::RequestFailed {
                details: "No prompt provided".to_string(),
            });
        }
        console::log_1(&format!("backend: sending user prompt ({} chars)", prompt.len()).into());
        let payload = user_prompt_payload(self.conversation_id.as_deref(), prompt);
        self.send(&self.user_prompt_url, &payload).await
    }

    pub async fn send_page_change(&self, html: &str) -> Result<Value, EngineError> {
        if html.is_empty() {
            return Err(EngineError::RequestFailed {
                details: "No page content provided".to_string(),
            });
        }
        console::log_1(&format!("backend: sending page change ({} chars)", html.len()).into());
        let payload = page_change_payload(self.conversation_id.as_deref(), html);
        self.send(&self.page_change_url, &payload).await
    }

    async fn send(&self, url: &str, payload: &Value) -> Result<Value, EngineError> {
        let res = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                console::error_1(&format!("backend: request to {} failed: {}", url, e).into());
                EngineError::RequestFailed {
                    details: format!("Request error: {}", e),
                }
            })?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_else(|_| "<no body>".to_string());
            console::error_1(&format!("backend: {} answered {}: {}", url, status, body).into());
            return Err(EngineError::RequestFailed {
                details: format!("HTTP {}: {}", status, body),
            });
        }

        res.json::<Value>().await.map_err(|e| {
            console::error_1(&format!("backend: invalid JSON from {}: {}", url, e).into());
            EngineError::RequestFailed {
                details: format!("JSON parsing error: {}", e),
            }
        })
    }
}
