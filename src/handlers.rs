use wasm_bindgen::{JsCast, JsValue};
use web_sys::{
    console, Element, Event, EventInit, HtmlElement, HtmlFormElement, HtmlInputElement, HtmlOptionElement,
    HtmlSelectElement, HtmlTextAreaElement, KeyboardEvent, KeyboardEventInit, MouseEvent, MouseEventInit,
    PointerEvent, PointerEventInit,
};

use crate::error::EngineError;
use crate::locator::{document, scroll_into_center};
use crate::params::ParamValue;

/// The fixed catalog of operations a plan step may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    TypeInto,
    Click,
    Focus,
    Submit,
    SelectOptionByValue,
    SelectOptionByIndex,
    SelectOption,
    Check,
    Radio,
    SimulateEnter,
    ScrollTo,
    WaitForElement,
}

impl Action {
    /// Accepts the canonical names and the older snake_case/alias names.
    pub fn parse(name: &str) -> Result<Self, EngineError> {
        let action = match name.trim() {
            "typeInto" | "enterValue" | "setValue" | "enter_value" | "enter_date" => Action::TypeInto,
            "click" => Action::Click,
            "focus" | "focusElement" => Action::Focus,
            "submit" | "submitForm" => Action::Submit,
            "selectOptionByValue" => Action::SelectOptionByValue,
            "selectOptionByIndex" => Action::SelectOptionByIndex,
            "select_option" => Action::SelectOption,
            "check" | "checkCheckbox" => Action::Check,
            "radio" | "checkRadioButton" => Action::Radio,
            "simulateEnter" | "enter" | "simulate_enter" => Action::SimulateEnter,
            "scrollTo" => Action::ScrollTo,
            "waitForElement" => Action::WaitForElement,
            other => {
                return Err(EngineError::UnknownAction {
                    action: other.to_string(),
                })
            }
        };
        Ok(action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::TypeInto => "typeInto",
            Action::Click => "click",
            Action::Focus => "focus",
            Action::Submit => "submit",
            Action::SelectOptionByValue => "selectOptionByValue",
            Action::SelectOptionByIndex => "selectOptionByIndex",
            Action::SelectOption => "select_option",
            Action::Check => "check",
            Action::Radio => "radio",
            Action::SimulateEnter => "simulateEnter",
            Action::ScrollTo => "scrollTo",
            Action::WaitForElement => "waitForElement",
        }
    }

    /// Actions the text fallback may satisfy by clicking a matching control.
    pub fn is_click_like(&self) -> bool {
        matches!(self, Action::Click | Action::Check | Action::Radio | Action::Submit)
    }
}

/// Runs one handler against a resolved element.
pub fn dispatch(action: Action, element: &Element, data: Option<&ParamValue>) -> Result<(), EngineError> {
    let text = data.map(|d| d.to_string()).unwrap_or_default();
    match action {
        Action::TypeInto => type_into(element, &text),
        Action::Click => pointer_click(element),
        Action::Focus => focus(element),
        Action::Submit => submit(element),
        Action::SelectOptionByValue => select_by_value(element, &text),
        Action::SelectOptionByIndex => {
            let index = index_from(action, data)?;
            select_by_index(element, index)
        }
        Action::SelectOption => match data.and_then(as_index) {
            Some(index) => select_by_index(element, index),
            None => select_by_value(element, &text),
        },
        Action::Check => set_checked(action, element, "checkbox", data),
        Action::Radio => set_checked(action, element, "radio", data),
        Action::SimulateEnter => simulate_enter(element),
        Action::ScrollTo => {
            scroll_into_center(element);
            Ok(())
        }
        // Resolving the element is the whole action.
        Action::WaitForElement => Ok(()),
    }
}

/// `<tag#id>` for error messages.
pub fn describe(element: &Element) -> String {
    let tag = element.tag_name().to_lowercase();
    let id = element.id();
    if id.is_empty() {
        format!("<{}>", tag)
    } else {
        format!("<{}#{}>", tag, id)
    }
}

pub fn looks_sensitive(input_type: &str, name: &str) -> bool {
    let name = name.to_lowercase();
    input_type.eq_ignore_ascii_case("password")
        || name.contains("password")
        || name.contains("user")
        || name.contains("code")
}

/// Password fields and inputs named like credentials or one-time codes.
pub fn is_sensitive_field(element: &Element) -> bool {
    if !element.tag_name().eq_ignore_ascii_case("input") {
        return false;
    }
    let input_type = element.get_attribute("type").unwrap_or_default();
    let name = element.get_attribute("name").unwrap_or_default();
    looks_sensitive(&input_type, &name)
}

/// Dispatches a plain bubbling event. False when a listener cancelled it.
pub(crate) fn fire_event(element: &Element, name: &str, cancelable: bool) -> Result<bool, EngineError> {
    let init = EventInit::new();
    init.set_bubbles(true);
    init.set_cancelable(cancelable);
    let event = Event::new_with_event_init_dict(name, &init)?;
    Ok(element.dispatch_event(&event)?)
}

fn fire_input_and_change(element: &Element) -> Result<(), EngineError> {
    fire_event(element, "input", false)?;
    fire_event(element, "change", false)?;
    Ok(())
}

/// Sets the text of an input, textarea or contenteditable element and
/// announces it with `input` and `change`.
pub(crate) fn write_text(element: &Element, text: &str) -> Result<(), EngineError> {
    if let Some(input) = element.dyn_ref::<HtmlInputElement>() {
        input.set_value(text);
    } else if let Some(area) = element.dyn_ref::<HtmlTextAreaElement>() {
        area.set_value(text);
    } else if let Some(editable) = element.dyn_ref::<HtmlElement>().filter(|h| h.is_content_editable()) {
        editable.set_text_content(Some(text));
    } else {
        return Err(EngineError::mismatch(
            "typeInto",
            "an input, textarea or contenteditable element",
            describe(element),
        ));
    }
    fire_input_and_change(element)
}

fn type_into(element: &Element, text: &str) -> Result<(), EngineError> {
    write_text(element, text)
}

fn pointer_event(name: &str) -> Result<PointerEvent, JsValue> {
    let init = PointerEventInit::new();
    init.set_bubbles(true);
    init.set_cancelable(true);
    init.set_pointer_id(1);
    init.set_pointer_type("mouse");
    init.set_is_primary(true);
    PointerEvent::new_with_event_init_dict(name, &init)
}

fn mouse_event(name: &str) -> Result<MouseEvent, JsValue> {
    let init = MouseEventInit::new();
    init.set_bubbles(true);
    init.set_cancelable(true);
    init.set_button(0);
    MouseEvent::new_with_mouse_event_init_dict(name, &init)
}

fn native_click(element: &Element) -> Result<(), JsValue> {
    match element.dyn_ref::<HtmlElement>() {
        Some(html) => {
            html.click();
            Ok(())
        }
        None => {
            let click = mouse_event("click")?;
            element.dispatch_event(&click).map(|_| ())
        }
    }
}

/// Pointer and mouse down/up followed by a native click, the sequence
/// framework widgets listen for. Falls back to a bare click.
pub(crate) fn pointer_click(element: &Element) -> Result<(), EngineError> {
    let sequence = || -> Result<(), JsValue> {
        let pointer_down = pointer_event("pointerdown")?;
        element.dispatch_event(&pointer_down)?;
        let mouse_down = mouse_event("mousedown")?;
        element.dispatch_event(&mouse_down)?;
        let pointer_up = pointer_event("pointerup")?;
        element.dispatch_event(&pointer_up)?;
        let mouse_up = mouse_event("mouseup")?;
        element.dispatch_event(&mouse_up)?;
        native_click(element)
    };
    match sequence() {
        Ok(()) => Ok(()),
        Err(e) => {
            console::warn_1(&format!("handlers: pointer sequence failed, plain click: {:?}", e).into());
            native_click(element).map_err(EngineError::from)
        }
    }
}

fn focus(element: &Element) -> Result<(), EngineError> {
    let html = element
        .dyn_ref::<HtmlElement>()
        .ok_or_else(|| EngineError::mismatch("focus", "a focusable element", describe(element)))?;
    html.focus()?;
    let focused = document()?
        .active_element()
        .map_or(false, |active| active.is_same_node(Some(element)));
    if focused {
        Ok(())
    } else {
        Err(EngineError::mismatch("focus", "a focusable element", describe(element)))
    }
}

fn submit(element: &Element) -> Result<(), EngineError> {
    let form = match element.dyn_ref::<HtmlFormElement>() {
        Some(form) => form.clone(),
        None => element
            .closest("form")?
            .and_then(|f| f.dyn_into::<HtmlFormElement>().ok())
            .ok_or_else(|| EngineError::mismatch("submit", "a form or an element inside one", describe(element)))?,
    };
    let proceed = fire_event(&form, "submit", true)?;
    if proceed {
        form.submit()?;
    } else {
        console::log_1(&"handlers: submit event cancelled by the page".into());
    }
    Ok(())
}

fn select_of<'a>(action: &str, element: &'a Element) -> Result<&'a HtmlSelectElement, EngineError> {
    element
        .dyn_ref::<HtmlSelectElement>()
        .ok_or_else(|| EngineError::mismatch(action, "a select element", describe(element)))
}

fn options_of(select: &HtmlSelectElement) -> Vec<HtmlOptionElement> {
    (0..select.length())
        .filter_map(|i| select.item(i))
        .filter_map(|el| el.dyn_into::<HtmlOptionElement>().ok())
        .collect()
}

/// Exact value match ignoring case, then option text containment either way.
pub fn matching_option(options: &[(String, String)], wanted: &str) -> Option<usize> {
    let wanted = wanted.trim().to_lowercase();
    if let Some(i) = options.iter().position(|(value, _)| value.to_lowercase() == wanted) {
        return Some(i);
    }
    if wanted.is_empty() {
        return None;
    }
    options.iter().position(|(_, text)| {
        let text = text.trim().to_lowercase();
        !text.is_empty() && (text.contains(&wanted) || wanted.contains(&text))
    })
}

fn select_by_value(element: &Element, wanted: &str) -> Result<(), EngineError> {
    let select = select_of("selectOptionByValue", element)?;
    let pairs: Vec<(String, String)> = options_of(select).iter().map(|o| (o.value(), o.text())).collect();
    let index = matching_option(&pairs, wanted).ok_or_else(|| EngineError::OptionNotFound {
        value: wanted.to_string(),
    })?;
    select.set_selected_index(index as i32);
    fire_event(element, "change", false)?;
    Ok(())
}

fn as_index(data: &ParamValue) -> Option<i64> {
    match data {
        ParamValue::Number(n) if n.fract() == 0.0 => Some(*n as i64),
        ParamValue::Text(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn index_from(action: Action, data: Option<&ParamValue>) -> Result<i64, EngineError> {
    data.and_then(as_index).ok_or_else(|| EngineError::InvalidData {
        action: action.name().to_string(),
        details: format!("expected an option index, got '{}'", data.map(|d| d.to_string()).unwrap_or_default()),
    })
}

fn select_by_index(element: &Element, index: i64) -> Result<(), EngineError> {
    let select = select_of("selectOptionByIndex", element)?;
    let len = select.length();
    if index < 0 || index >= len as i64 {
        return Err(EngineError::IndexOutOfBounds { index, len });
    }
    select.set_selected_index(index as i32);
    fire_event(element, "change", false)?;
    Ok(())
}

/// Missing data means "check it".
pub fn checked_from(data: Option<&ParamValue>) -> bool {
    match data {
        None => true,
        Some(ParamValue::Bool(b)) => *b,
        Some(ParamValue::Number(n)) => *n != 0.0,
        Some(ParamValue::Text(s)) => !matches!(
            s.trim().to_lowercase().as_str(),
            "false" | "no" | "0" | "off" | "unchecked"
        ),
    }
}

fn set_checked(action: Action, element: &Element, input_type: &str, data: Option<&ParamValue>) -> Result<(), EngineError> {
    let expected = format!("an input of type {}", input_type);
    let input = element
        .dyn_ref::<HtmlInputElement>()
        .filter(|i| i.type_().eq_ignore_ascii_case(input_type))
        .ok_or_else(|| EngineError::mismatch(action.name(), &expected, describe(element)))?;
    input.set_checked(checked_from(data));
    fire_event(element, "change", false)?;
    Ok(())
}

fn simulate_enter(element: &Element) -> Result<(), EngineError> {
    for name in ["keydown", "keyup"] {
        let init = KeyboardEventInit::new();
        init.set_key("Enter");
        init.set_code("Enter");
        init.set_bubbles(true);
        init.set_cancelable(true);
        let event = KeyboardEvent::new_with_keyboard_event_init_dict(name, &init)?;
        element.dispatch_event(&event)?;
    }
    Ok(())
}
