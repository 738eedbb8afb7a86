use gloo_timers::future::TimeoutFuture;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;
use web_sys::{console, Element};

use crate::config::{AgentConfig, EngineTimings};
use crate::error::EngineError;
use crate::fallback::{click_by_text, click_trip_mode, text_hint, trip_mode_hint};
use crate::handlers::{dispatch, is_sensitive_field, Action};
use crate::interaction::{Interaction, WindowInteraction};
use crate::locator::{classify_selector, scroll_into_center, Locator, SelectorKind};
use crate::params::{ParamValue, ParameterStore};
use crate::visibility::is_visible;
use crate::widgets::{SiteWidgets, WidgetHelper};

/// Data value asking the engine to collect the input from the user.
pub const FROM_USER: &str = "<<from user>>";
const MASK: &str = "******";
const SENSITIVE_WARNING: &str = "Warning: This field is security-sensitive. Your input may be overheard. \
                                 Please ensure no one else is listening.";
const SPELL_PROMPT: &str = "Please spell your input letter by letter, with spaces between each letter.";

const VIA_LOCATION: &str = "location-fast-path";
const VIA_TEXT: &str = "text-fallback";
const VIA_TRIP_MODE: &str = "trip-mode-fallback";

/// One abstract UI action of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: String,
    #[serde(alias = "element")]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, rename = "delay", skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub action: String,
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when a fast path or fallback produced the success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

impl StepResult {
    fn ok(step: &PlanStep, value: Option<String>) -> Self {
        StepResult {
            action: step.action.clone(),
            selector: step.selector.clone(),
            value,
            success: true,
            error: None,
            via: None,
        }
    }

    fn synthesized(step: &PlanStep, via: &str) -> Self {
        StepResult {
            via: Some(via.to_string()),
            ..StepResult::ok(step, None)
        }
    }

    fn failed(step: &PlanStep, value: Option<String>, error: &EngineError) -> Self {
        StepResult {
            action: step.action.clone(),
            selector: step.selector.clone(),
            value,
            success: false,
            error: Some(error.to_string()),
            via: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStatus {
    pub status: PlanState,
    pub results: Vec<StepResult>,
    pub last_step_index: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PlanStatus {
    fn running() -> Self {
        PlanStatus {
            status: PlanState::Running,
            results: Vec::new(),
            last_step_index: -1,
            error_message: None,
        }
    }

    fn record(&mut self, result: StepResult) {
        self.results.push(result);
        self.last_step_index = self.results.len() as i64 - 1;
    }

    pub fn is_completed(&self) -> bool {
        self.status == PlanState::Completed
    }
}

/// Validates the wire form of a plan. Non-scalar `data` is kept as its JSON text.
pub fn parse_plan(plan: &Value) -> Result<Vec<PlanStep>, EngineError> {
    let entries = plan
        .as_array()
        .ok_or_else(|| EngineError::malformed("Plan data is invalid or missing: expected an array of steps"))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let n = i + 1;
            let object = entry
                .as_object()
                .ok_or_else(|| EngineError::malformed(format!("Step {} is not an object", n)))?;
            let action = object
                .get("action")
                .and_then(Value::as_str)
                .filter(|a| !a.trim().is_empty())
                .ok_or_else(|| EngineError::malformed(format!("Step {} is missing an 'action' string", n)))?;
            let selector = object
                .get("selector")
                .or_else(|| object.get("element"))
                .and_then(Value::as_str)
                .ok_or_else(|| EngineError::malformed(format!("Step {} is missing a 'selector' string", n)))?;
            let data = match object.get("data") {
                None | Some(Value::Null) => None,
                Some(value @ (Value::Array(_) | Value::Object(_))) => Some(Value::String(value.to_string())),
                Some(value) => Some(value.clone()),
            };
            let delay_ms = object
                .get("delay")
                .and_then(Value::as_f64)
                .filter(|d| d.is_finite() && *d >= 0.0)
                .map(|d| d.min(u32::MAX as f64) as u32);
            Ok(PlanStep {
                action: action.trim().to_string(),
                selector: selector.to_string(),
                data,
                delay_ms,
            })
        })
        .collect()
}

/// `{{name}}` -> `name`.
pub fn parameter_reference(text: &str) -> Option<&str> {
    let inner = text.trim().strip_prefix("{{")?.strip_suffix("}}")?.trim();
    if inner.is_empty() {
        None
    } else {
        Some(inner)
    }
}

struct StepOutcome {
    result: StepResult,
    location_selected: bool,
}

impl From<StepResult> for StepOutcome {
    fn from(result: StepResult) -> Self {
        StepOutcome {
            result,
            location_selected: false,
        }
    }
}

/// Replays plans against the live page, one step at a time.
pub struct PlanExecutor {
    locator: Locator,
    interaction: Rc<dyn Interaction>,
    widgets: Option<Rc<dyn WidgetHelper>>,
    timings: EngineTimings,
    sender: String,
}

impl PlanExecutor {
    pub fn new(interaction: Rc<dyn Interaction>, config: &AgentConfig) -> Self {
        let locator = Locator::new(interaction.clone(), &config.timings, &config.sender_name).with_debug(config.debug);
        PlanExecutor {
            locator,
            interaction,
            widgets: None,
            timings: config.timings.clone(),
            sender: config.sender_name.clone(),
        }
    }

    pub fn with_widgets(mut self, widgets: Rc<dyn WidgetHelper>) -> Self {
        self.locator = self.locator.with_widgets(widgets.clone());
        self.widgets = Some(widgets);
        self
    }

    /// The in-page setup: chat/speech bridge plus the travel-site widgets.
    pub fn from_config(config: &AgentConfig) -> Self {
        let interaction: Rc<dyn Interaction> = Rc::new(WindowInteraction::new(&config.timings, &config.sender_name));
        PlanExecutor::new(interaction, config).with_widgets(Rc::new(SiteWidgets::new(&config.timings)))
    }

    pub fn interaction(&self) -> &Rc<dyn Interaction> {
        &self.interaction
    }

    fn notify(&self, text: &str) {
        self.interaction.notify(&self.sender, text);
    }

    /// Validates a wire plan and runs it; malformed plans fail without touching the page.
    pub async fn execute_plan_json(&self, plan: &Value, parameters: &Value) -> PlanStatus {
        match parse_plan(plan) {
            Ok(steps) => self.execute_plan(&steps, parameters).await,
            Err(e) => self.reject_malformed(&e),
        }
    }

    pub fn reject_malformed(&self, error: &EngineError) -> PlanStatus {
        console::error_1(&format!("executor: rejecting plan: {}", error).into());
        self.notify(&format!("Failed to execute plan: {}", error));
        let mut status = PlanStatus::running();
        status.record(StepResult {
            action: String::new(),
            selector: String::new(),
            value: None,
            success: false,
            error: Some(error.to_string()),
            via: None,
        });
        status.status = PlanState::Failed;
        status.error_message = Some(error.to_string());
        status
    }

    pub async fn execute_plan(&self, steps: &[PlanStep], initial_parameters: &Value) -> PlanStatus {
        console::log_1(&format!("executor: starting plan with {} step(s)", steps.len()).into());
        let store = ParameterStore::from_json(initial_parameters, self.interaction.clone(), &self.sender);
        let mut status = PlanStatus::running();
        let mut location_selected = false;

        for (i, step) in steps.iter().enumerate() {
            if location_selected && classify_selector(&step.selector) == SelectorKind::AutocompleteOption {
                console::log_1(&format!("executor: step {} covered by location selection", i + 1).into());
                status.record(StepResult::synthesized(step, VIA_LOCATION));
                continue;
            }

            let outcome = self.run_step(step, &store).await;
            location_selected = outcome.location_selected;
            let result = outcome.result;

            if !result.success {
                let error = result.error.clone().unwrap_or_default();
                console::error_1(&format!("executor: step {} failed: {}", i + 1, error).into());
                self.notify(&format!("Step {} ({} {}) failed: {}", i + 1, step.action, step.selector, error));
                status.record(result);
                status.status = PlanState::Failed;
                self.notify(&format!("Plan failed: {}", error));
                status.error_message = Some(error);
                return status;
            }
            status.record(result);

            if i + 1 < steps.len() {
                TimeoutFuture::new(step.delay_ms.unwrap_or(self.timings.step_settle_ms)).await;
            }
        }

        status.status = PlanState::Completed;
        self.notify("Plan completed.");
        status
    }

    async fn run_step(&self, step: &PlanStep, store: &ParameterStore) -> StepOutcome {
        let action = match Action::parse(&step.action) {
            Ok(action) => action,
            Err(e) => return StepResult::failed(step, None, &e).into(),
        };

        if action == Action::WaitForElement {
            let timeout = step
                .data
                .as_ref()
                .and_then(ParamValue::from_json)
                .and_then(|d| d.to_string().trim().parse::<u32>().ok());
            return match self.locator.locate(&step.selector, timeout).await {
                Ok(_) => StepResult::ok(step, None).into(),
                Err(e) => StepResult::failed(step, None, &e).into(),
            };
        }

        let element = match self.locator.locate(&step.selector, None).await {
            Ok(element) => element,
            Err(e) if e.is_not_found() => return self.recover(action, step, &e).into(),
            Err(e) => return StepResult::failed(step, None, &e).into(),
        };

        if let Err(e) = self.ensure_visible(&element, &step.selector).await {
            return StepResult::failed(step, None, &e).into();
        }

        let sensitive = action == Action::TypeInto && is_sensitive_field(&element);
        if sensitive {
            if let Err(e) = self.confirm_sensitive().await {
                return StepResult::failed(step, None, &e).into();
            }
        }

        let data = match self.resolve_data(step, &element, sensitive, store).await {
            Ok(data) => data,
            Err(e) => return StepResult::failed(step, None, &e).into(),
        };
        let recorded = data.as_ref().map(|d| if sensitive { MASK.to_string() } else { d.to_string() });

        if action == Action::TypeInto {
            if let (Some(widgets), SelectorKind::TravelField(mode), Some(text)) =
                (&self.widgets, classify_selector(&step.selector), data.as_ref())
            {
                if widgets.select_location(mode, &element, &text.to_string()).await {
                    return StepOutcome {
                        result: StepResult {
                            via: Some(VIA_LOCATION.to_string()),
                            ..StepResult::ok(step, recorded)
                        },
                        location_selected: true,
                    };
                }
                console::warn_1(&"executor: location fast path failed, typing instead".into());
            }
        }

        match dispatch(action, &element, data.as_ref()) {
            Ok(()) => StepResult::ok(step, recorded).into(),
            Err(e) => StepResult::failed(step, recorded, &e).into(),
        }
    }

    /// Trip-type and text fallbacks for targets the locator could not find.
    fn recover(&self, action: Action, step: &PlanStep, error: &EngineError) -> StepResult {
        if let Some(mode) = trip_mode_hint(&step.selector) {
            if click_trip_mode(mode) {
                console::log_1(&format!("executor: '{}' satisfied by {:?} trip control", step.selector, mode).into());
                return StepResult::synthesized(step, VIA_TRIP_MODE);
            }
        }
        if action.is_click_like() {
            if let Some(text) = text_hint(&step.selector) {
                if click_by_text(&text) {
                    console::log_1(&format!("executor: '{}' satisfied by text '{}'", step.selector, text).into());
                    return StepResult::synthesized(step, VIA_TEXT);
                }
            }
        }
        StepResult::failed(step, None, error)
    }

    async fn ensure_visible(&self, element: &Element, selector: &str) -> Result<(), EngineError> {
        if is_visible(element) {
            return Ok(());
        }
        scroll_into_center(element);
        TimeoutFuture::new(self.timings.scroll_settle_ms).await;
        if is_visible(element) {
            Ok(())
        } else {
            Err(EngineError::not_found(
                selector,
                format!("Element '{}' is no longer visible", selector),
            ))
        }
    }

    async fn confirm_sensitive(&self) -> Result<(), EngineError> {
        self.notify(SENSITIVE_WARNING);
        match self.interaction.ask_confirmation("Proceed automatically?").await {
            Some(true) => Ok(()),
            _ => Err(EngineError::ConfirmationDenied {
                message: "User did not confirm sensitive input.".to_string(),
            }),
        }
    }

    /// Literal, `{{name}}` reference, bare parameter key, or the from-user marker.
    async fn resolve_data(
        &self,
        step: &PlanStep,
        element: &Element,
        sensitive: bool,
        store: &ParameterStore,
    ) -> Result<Option<ParamValue>, EngineError> {
        let value = match step.data.as_ref().and_then(ParamValue::from_json) {
            Some(value) => value,
            None => return Ok(None),
        };
        let text = match value.as_text() {
            Some(text) => text,
            None => return Ok(Some(value)),
        };

        if text.trim() == FROM_USER {
            let key = field_key(element, &step.selector);
            let prompt = if sensitive { Some(SPELL_PROMPT) } else { None };
            let answer = store
                .get(Some(&key), prompt, sensitive)
                .await
                .ok_or_else(|| EngineError::ParameterUnresolved {
                    key: key.clone(),
                    reason: "the user did not provide a value".to_string(),
                })?;
            return Ok(Some(if sensitive {
                ParamValue::Text(answer.to_string().split_whitespace().collect())
            } else {
                answer
            }));
        }

        if let Some(key) = parameter_reference(text) {
            return store
                .get(Some(key), None, sensitive)
                .await
                .map(Some)
                .ok_or_else(|| EngineError::ParameterUnresolved {
                    key: key.to_string(),
                    reason: "no value was provided".to_string(),
                });
        }

        if let Some(bound) = store.peek(text) {
            return Ok(Some(bound));
        }
        Ok(Some(value))
    }
}

/// Parameter key for a field: its name, else its id, else the selector.
fn field_key(element: &Element, selector: &str) -> String {
    element
        .get_attribute("name")
        .filter(|n| !n.trim().is_empty())
        .or_else(|| Some(element.id()).filter(|id| !id.is_empty()))
        .unwrap_or_else(|| selector.to_string())
}
