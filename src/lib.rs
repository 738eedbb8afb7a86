use js_sys::Promise;
use serde_json::Value;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::backend::BackendClient;
use crate::channel::CommandChannel;
use crate::config::AgentConfig;
use crate::error::EngineError;
use crate::executor::PlanExecutor;

pub mod backend;
pub mod channel;
pub mod config;
pub mod error;
pub mod executor;
pub mod fallback;
pub mod handlers;
pub mod interaction;
pub mod locator;
pub mod params;
pub mod visibility;
pub mod widgets;

fn parse_json(text: Option<String>, what: &str) -> Result<Value, EngineError> {
    match text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        Some(text) => serde_json::from_str(text)
            .map_err(|e| EngineError::malformed(format!("{} is not valid JSON: {}", what, e))),
        None => Ok(Value::Object(Default::default())),
    }
}

// Expose the page agent to the extension's content script
#[wasm_bindgen]
pub struct SaccesscoAgent {
    executor: Rc<PlanExecutor>,
    channel: CommandChannel,
    backend: Rc<BackendClient>,
}

#[wasm_bindgen]
impl SaccesscoAgent {
    /// Builds the agent from an optional JSON configuration; missing keys keep their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> Result<SaccesscoAgent, JsValue> {
        let config = AgentConfig::from_json(config_json.as_deref().unwrap_or(""))?;
        let executor = Rc::new(PlanExecutor::from_config(&config));
        Ok(SaccesscoAgent {
            channel: CommandChannel::new(&config, executor.clone()),
            backend: Rc::new(BackendClient::new(&config)),
            executor,
        })
    }

    /// Runs a plan and resolves to the JSON-encoded plan status. Malformed
    /// input resolves to a failed status rather than rejecting.
    #[wasm_bindgen(js_name = executePlan)]
    pub fn execute_plan(&self, plan_json: String, params_json: Option<String>) -> Promise {
        let executor = self.executor.clone();
        future_to_promise(async move {
            let plan = parse_json(Some(plan_json), "Plan");
            let params = parse_json(params_json, "Parameters").unwrap_or_else(|e| {
                web_sys::console::warn_1(&format!("agent: ignoring parameters: {}", e).into());
                Value::Object(Default::default())
            });
            let status = match plan {
                Ok(plan) => executor.execute_plan_json(&plan, &params).await,
                Err(e) => executor.reject_malformed(&e),
            };
            serde_json::to_string(&status)
                .map(JsValue::from)
                .map_err(|e| JsValue::from_str(&format!("Failed to serialize plan status: {}", e)))
        })
    }

    /// Feeds one inbound command as if it arrived over the WebSocket.
    #[wasm_bindgen(js_name = handleCommand)]
    pub fn handle_command(&self, json: &str) {
        self.channel.handle_text(json);
    }

    pub fn start(&self) -> Result<(), JsValue> {
        self.channel.start().map_err(Into::into)
    }

    pub fn stop(&self) {
        self.channel.stop();
    }

    #[wasm_bindgen(js_name = sendUserPrompt)]
    pub fn send_user_prompt(&self, text: String) -> Promise {
        let backend = self.backend.clone();
        future_to_promise(async move {
            let response = backend.send_user_prompt(&text).await?;
            Ok(JsValue::from(response.to_string()))
        })
    }

    #[wasm_bindgen(js_name = sendPageChange)]
    pub fn send_page_change(&self, html: String) -> Promise {
        let backend = self.backend.clone();
        future_to_promise(async move {
            let response = backend.send_page_change(&html).await?;
            Ok(JsValue::from(response.to_string()))
        })
    }
}

// Initialize WASM module and log to console
#[wasm_bindgen(start)]
pub fn run() -> Result<(), JsValue> {
    #[cfg(debug_assertions)]
    console_error_panic_hook::set_once(); // Better panic messages in browser
    web_sys::console::log_1(&"SaccesscoAgent initialized!".into());
    Ok(())
}
