use thiserror::Error;
use wasm_bindgen::{JsCast, JsValue};

/// Every failure the engine can record against a plan step.
///
/// Locator, handler and collaborator calls convert JS exceptions into one of
/// these variants; the executor renders them into `StepResult::error` with
/// `to_string()`, so the `Display` strings are what the user ends up reading.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("SelectorInvalid: Invalid selector '{selector}'. Details: {details}")]
    SelectorInvalid { selector: String, details: String },

    #[error("ElementNotFound: {message}")]
    ElementNotFound { selector: String, message: String },

    #[error("HandlerMismatch: '{action}' expects {expected}, found {found}")]
    HandlerMismatch {
        action: String,
        expected: String,
        found: String,
    },

    #[error("HandlerMismatch: '{action}' received unusable data: {details}")]
    InvalidData { action: String, details: String },

    #[error("OptionNotFound: No option matches '{value}'")]
    OptionNotFound { value: String },

    #[error("IndexOutOfBounds: Option index {index} is out of range (select has {len} options)")]
    IndexOutOfBounds { index: i64, len: u32 },

    #[error("UnknownAction: '{action}' is not a supported action")]
    UnknownAction { action: String },

    #[error("ParameterUnresolved: No value for '{key}' ({reason})")]
    ParameterUnresolved { key: String, reason: String },

    #[error("ConfirmationDenied: {message}")]
    ConfirmationDenied { message: String },

    #[error("PlanMalformed: {reason}")]
    PlanMalformed { reason: String },

    #[error("TransportUnavailable: {module} is not available")]
    TransportUnavailable { module: String },

    #[error("RequestFailed: {details}")]
    RequestFailed { details: String },

    #[error("InvalidConfig: {details}")]
    InvalidConfig { details: String },

    #[error("JsError: {message}")]
    Js { message: String },
}

impl EngineError {
    pub fn not_found(selector: &str, message: impl Into<String>) -> Self {
        EngineError::ElementNotFound {
            selector: selector.to_string(),
            message: message.into(),
        }
    }

    pub fn mismatch(action: &str, expected: &str, found: impl Into<String>) -> Self {
        EngineError::HandlerMismatch {
            action: action.to_string(),
            expected: expected.to_string(),
            found: found.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        EngineError::PlanMalformed {
            reason: reason.into(),
        }
    }

    /// True for the failure class that the executor may recover from with its
    /// fallback matchers.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::ElementNotFound { .. })
    }
}

/// Best-effort text for a thrown JS value: plain strings, `Error` objects, or
/// the debug rendering as a last resort.
pub fn js_error_message(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{:?}", value)
}

impl From<JsValue> for EngineError {
    fn from(value: JsValue) -> Self {
        EngineError::Js {
            message: js_error_message(&value),
        }
    }
}

impl From<EngineError> for JsValue {
    fn from(error: EngineError) -> Self {
        JsValue::from_str(&error.to_string())
    }
}
