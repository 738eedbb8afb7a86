use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use web_sys::console;

use crate::error::EngineError;
use crate::interaction::Interaction;

/// A scalar parameter value as it arrives on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Scalars only; `null`, arrays and objects have no parameter form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(ParamValue::Bool(*b)),
            Value::Number(n) => n.as_f64().map(ParamValue::Number),
            Value::String(s) => Some(ParamValue::Text(s.clone())),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

/// Named values for one plan run. Missing keys are asked for once and
/// remembered for the rest of the run.
pub struct ParameterStore {
    values: RefCell<HashMap<String, ParamValue>>,
    interaction: Rc<dyn Interaction>,
    sender: String,
}

impl ParameterStore {
    pub fn new(initial: HashMap<String, ParamValue>, interaction: Rc<dyn Interaction>, sender: &str) -> Self {
        ParameterStore {
            values: RefCell::new(initial),
            interaction,
            sender: sender.to_string(),
        }
    }

    /// Seeds the store from a JSON object. Non-object input seeds nothing.
    pub fn from_json(initial: &Value, interaction: Rc<dyn Interaction>, sender: &str) -> Self {
        let mut values = HashMap::new();
        match initial {
            Value::Object(map) => {
                for (key, value) in map {
                    match ParamValue::from_json(value) {
                        Some(param) => {
                            values.insert(key.clone(), param);
                        }
                        None => console::warn_1(
                            &format!("params: dropping parameter '{}' with unsupported value {}", key, value).into(),
                        ),
                    }
                }
            }
            Value::Null => {}
            other => console::warn_1(&format!("params: initial parameters are not an object: {}", other).into()),
        }
        ParameterStore::new(values, interaction, sender)
    }

    pub async fn get(&self, key: Option<&str>, prompt: Option<&str>, sensitive: bool) -> Option<ParamValue> {
        let key = key.map(str::trim).filter(|k| !k.is_empty())?;

        let cached = self.values.borrow().get(key).cloned();
        if cached.is_some() {
            return cached;
        }

        let default_prompt = format!("Please provide the value for {}:", key);
        let prompt = prompt.unwrap_or(&default_prompt);
        match self.interaction.ask_user(prompt, sensitive).await {
            Ok(Some(answer)) if !answer.trim().is_empty() => {
                let value = ParamValue::Text(answer);
                self.values.borrow_mut().insert(key.to_string(), value.clone());
                Some(value)
            }
            Ok(_) => {
                self.interaction.notify(
                    &self.sender,
                    &format!("Input for '{}' was not provided or cancelled. Action may be incomplete.", key),
                );
                None
            }
            Err(e) => {
                self.report_failure(key, &e);
                None
            }
        }
    }

    fn report_failure(&self, key: &str, error: &EngineError) {
        console::error_1(&format!("params: failed to retrieve input for '{}': {}", key, error).into());
        self.interaction
            .notify(&self.sender, &format!("Error retrieving input for '{}': {}", key, error));
    }

    pub fn set(&self, key: &str, value: ParamValue) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.borrow().contains_key(key)
    }

    /// Cached value without prompting.
    pub fn peek(&self, key: &str) -> Option<ParamValue> {
        self.values.borrow().get(key).cloned()
    }

    pub fn get_all(&self) -> HashMap<String, ParamValue> {
        self.values.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::scripted::ScriptedInteraction;
    use serde_json::json;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    fn store_with(scripted: Rc<ScriptedInteraction>, initial: Value) -> ParameterStore {
        ParameterStore::from_json(&initial, scripted, "Saccessco")
    }

    #[test]
    fn test_param_value_display() {
        assert_eq!(ParamValue::Number(3.0).to_string(), "3");
        assert_eq!(ParamValue::Number(2.5).to_string(), "2.5");
        assert_eq!(ParamValue::Bool(false).to_string(), "false");
        assert_eq!(ParamValue::from("Paris").to_string(), "Paris");
    }

    #[test]
    fn test_param_value_from_json_scalars_only() {
        assert_eq!(ParamValue::from_json(&json!(true)), Some(ParamValue::Bool(true)));
        assert_eq!(ParamValue::from_json(&json!(7)), Some(ParamValue::Number(7.0)));
        assert_eq!(ParamValue::from_json(&json!("x")), Some(ParamValue::Text("x".to_string())));
        assert_eq!(ParamValue::from_json(&json!(null)), None);
        assert_eq!(ParamValue::from_json(&json!([1, 2])), None);
        assert_eq!(ParamValue::from_json(&json!({"a": 1})), None);
    }

    #[wasm_bindgen_test]
    async fn test_seeded_values_skip_nulls_and_objects() {
        let scripted = Rc::new(ScriptedInteraction::default());
        let store = store_with(scripted, json!({"city": "Oslo", "adults": 2, "skip": null, "nested": {"a": 1}}));
        let all = store.get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all.get("adults"), Some(&ParamValue::Number(2.0)));
        assert!(!store.contains("skip"));
    }

    #[wasm_bindgen_test]
    async fn test_get_empty_key_returns_none_without_prompting() {
        let scripted = Rc::new(ScriptedInteraction::with_answers(&[Some("ignored")]));
        let store = store_with(scripted.clone(), json!({}));
        assert_eq!(store.get(None, None, false).await, None);
        assert_eq!(store.get(Some("  "), None, false).await, None);
        assert_eq!(scripted.ask_calls.get(), 0);
    }

    #[wasm_bindgen_test]
    async fn test_get_prompts_once_then_uses_cache() {
        let scripted = Rc::new(ScriptedInteraction::with_answers(&[Some("alice")]));
        let store = store_with(scripted.clone(), json!({}));

        let first = store.get(Some("username"), None, false).await;
        let second = store.get(Some("username"), None, false).await;
        assert_eq!(first, Some(ParamValue::Text("alice".to_string())));
        assert_eq!(second, first);
        assert_eq!(scripted.ask_calls.get(), 1);
        assert_eq!(
            scripted.prompts.borrow()[0],
            ("Please provide the value for username:".to_string(), false)
        );
    }

    #[wasm_bindgen_test]
    async fn test_set_then_get_does_not_prompt() {
        let scripted = Rc::new(ScriptedInteraction::default());
        let store = store_with(scripted.clone(), json!({}));
        store.set("date", ParamValue::from("2025-05-01"));
        assert_eq!(store.get(Some("date"), None, false).await, Some(ParamValue::from("2025-05-01")));
        assert_eq!(scripted.ask_calls.get(), 0);
    }

    #[wasm_bindgen_test]
    async fn test_blank_answer_is_not_cached() {
        let scripted = Rc::new(ScriptedInteraction::with_answers(&[Some("   "), Some("later")]));
        let store = store_with(scripted.clone(), json!({}));

        assert_eq!(store.get(Some("code"), Some("Code?"), true).await, None);
        assert!(!store.contains("code"));
        assert_eq!(
            scripted.notices.borrow()[0],
            "Input for 'code' was not provided or cancelled. Action may be incomplete."
        );
        assert_eq!(store.get(Some("code"), Some("Code?"), true).await, Some(ParamValue::from("later")));
        assert_eq!(scripted.prompts.borrow()[1], ("Code?".to_string(), true));
    }

    #[wasm_bindgen_test]
    async fn test_unavailable_transport_yields_none() {
        let scripted = Rc::new(ScriptedInteraction::default());
        scripted.unavailable.set(true);
        let store = store_with(scripted.clone(), json!({}));
        assert_eq!(store.get(Some("email"), None, false).await, None);
        assert!(scripted.notices.borrow()[0].starts_with("Error retrieving input for 'email': TransportUnavailable"));
    }
}
