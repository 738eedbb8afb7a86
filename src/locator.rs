use futures::future::{select, Either};
use futures_util::stream::StreamExt;
use gloo_timers::future::{IntervalStream, TimeoutFuture};
use std::rc::Rc;
use wasm_bindgen::JsCast;
use web_sys::{
    console, Document, Element, NodeList, ScrollBehavior, ScrollIntoViewOptions, ScrollLogicalPosition,
    XPathResult,
};

use crate::config::EngineTimings;
use crate::error::{js_error_message, EngineError};
use crate::interaction::Interaction;
use crate::visibility::is_visible;
use crate::widgets::dates::is_date_selector;
use crate::widgets::locations::{travel_mode_for_selector, TravelMode};
use crate::widgets::WidgetHelper;

// XPathResult.ORDERED_NODE_SNAPSHOT_TYPE
const ORDERED_NODE_SNAPSHOT_TYPE: u16 = 7;

pub fn document() -> Result<Document, EngineError> {
    web_sys::window()
        .and_then(|w| w.document())
        .ok_or_else(|| EngineError::Js {
            message: "Failed to get document object".to_string(),
        })
}

/// A selector split into its query language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query<'a> {
    Css(&'a str),
    XPath(&'a str),
}

impl<'a> Query<'a> {
    /// `xpath:` and `css:` prefixes pick the language; anything else is CSS.
    pub fn parse(selector: &'a str) -> Result<Self, EngineError> {
        let trimmed = selector.trim();
        let query = if let Some(xpath) = trimmed.strip_prefix("xpath:") {
            Query::XPath(xpath.trim())
        } else if let Some(css) = trimmed.strip_prefix("css:") {
            Query::Css(css.trim())
        } else {
            Query::Css(trimmed)
        };
        let body = match query {
            Query::Css(s) | Query::XPath(s) => s,
        };
        if body.is_empty() {
            return Err(EngineError::SelectorInvalid {
                selector: selector.to_string(),
                details: "selector is empty".to_string(),
            });
        }
        Ok(query)
    }
}

fn invalid(selector: &str, error: wasm_bindgen::JsValue) -> EngineError {
    EngineError::SelectorInvalid {
        selector: selector.to_string(),
        details: js_error_message(&error),
    }
}

/// Single non-waiting lookup. `Ok(None)` when nothing matches.
pub fn query(selector: &str) -> Result<Option<Element>, EngineError> {
    let document = document()?;
    match Query::parse(selector)? {
        Query::Css(css) => document.query_selector(css).map_err(|e| invalid(selector, e)),
        Query::XPath(xpath) => {
            let result = document
                .evaluate(xpath, &document)
                .map_err(|e| invalid(selector, e))?;
            let node = result.single_node_value().map_err(|e| invalid(selector, e))?;
            Ok(node.and_then(|n| n.dyn_into::<Element>().ok()))
        }
    }
}

/// Every element matching the selector, in document order.
pub fn query_all(selector: &str) -> Result<Vec<Element>, EngineError> {
    let document = document()?;
    match Query::parse(selector)? {
        Query::Css(css) => {
            let nodes: NodeList = document.query_selector_all(css).map_err(|e| invalid(selector, e))?;
            Ok(elements_of(&nodes))
        }
        Query::XPath(xpath) => {
            let snapshot: XPathResult = document
                .evaluate_with_opt_callback_and_type(xpath, &document, None, ORDERED_NODE_SNAPSHOT_TYPE)
                .map_err(|e| invalid(selector, e))?;
            let len = snapshot.snapshot_length().map_err(|e| invalid(selector, e))?;
            let mut elements = Vec::with_capacity(len as usize);
            for i in 0..len {
                if let Ok(Some(node)) = snapshot.snapshot_item(i) {
                    if let Ok(element) = node.dyn_into::<Element>() {
                        elements.push(element);
                    }
                }
            }
            Ok(elements)
        }
    }
}

pub(crate) fn elements_of(nodes: &NodeList) -> Vec<Element> {
    (0..nodes.length())
        .filter_map(|i| nodes.item(i))
        .filter_map(|node| node.dyn_into::<Element>().ok())
        .collect()
}

/// CSS lookups that swallow invalid-selector errors, for the widget and
/// fallback heuristics that try many candidate selectors.
pub(crate) fn query_quiet(css: &str) -> Option<Element> {
    document().ok()?.query_selector(css).ok().flatten()
}

pub(crate) fn query_all_quiet(css: &str) -> Vec<Element> {
    document()
        .ok()
        .and_then(|d| d.query_selector_all(css).ok())
        .map(|nodes| elements_of(&nodes))
        .unwrap_or_default()
}

pub fn element_exists(selector: &str) -> Result<bool, EngineError> {
    query(selector).map(|found| found.is_some())
}

pub fn scroll_into_center(element: &Element) {
    let options = ScrollIntoViewOptions::new();
    options.set_behavior(ScrollBehavior::Smooth);
    options.set_block(ScrollLogicalPosition::Center);
    element.scroll_into_view_with_scroll_into_view_options(&options);
}

/// What kind of target a selector points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Generic,
    DateCell,
    TravelField(TravelMode),
    AutocompleteOption,
}

pub fn classify_selector(selector: &str) -> SelectorKind {
    let lower = selector.to_lowercase();
    if lower.contains("role='option'") || lower.contains("role=\"option\"") || lower.contains("listbox") {
        return SelectorKind::AutocompleteOption;
    }
    if is_date_selector(selector) {
        return SelectorKind::DateCell;
    }
    match travel_mode_for_selector(selector) {
        Some(mode) => SelectorKind::TravelField(mode),
        None => SelectorKind::Generic,
    }
}

/// Resolves selectors against the live document, waiting for the target to
/// render and scroll into view.
pub struct Locator {
    widgets: Option<Rc<dyn WidgetHelper>>,
    interaction: Rc<dyn Interaction>,
    sender: String,
    timeout_ms: u32,
    poll_interval_ms: u32,
    scroll_settle_ms: u32,
    debug: bool,
}

impl Locator {
    pub fn new(interaction: Rc<dyn Interaction>, timings: &EngineTimings, sender: &str) -> Self {
        Locator {
            widgets: None,
            interaction,
            sender: sender.to_string(),
            timeout_ms: timings.locator_timeout_ms,
            poll_interval_ms: timings.poll_interval_ms.max(1),
            scroll_settle_ms: timings.scroll_settle_ms,
            debug: false,
        }
    }

    pub fn with_widgets(mut self, widgets: Rc<dyn WidgetHelper>) -> Self {
        self.widgets = Some(widgets);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Like [`Locator::locate`] but reports failures to the user and hands
    /// back only the element.
    pub async fn find(&self, selector: &str, timeout_ms: Option<u32>) -> Option<Element> {
        match self.locate(selector, timeout_ms).await {
            Ok(element) => Some(element),
            Err(e) => {
                let notice = match &e {
                    EngineError::ElementNotFound { .. } => format!("Element not found: {}", selector),
                    other => other.to_string(),
                };
                self.interaction.notify(&self.sender, &notice);
                None
            }
        }
    }

    pub async fn locate(&self, selector: &str, timeout_ms: Option<u32>) -> Result<Element, EngineError> {
        // Also rejects malformed selectors before any waiting.
        let present = query(selector)?.is_some();

        // Helpers only prepare the page; the selector itself picks the element.
        if let (false, Some(widgets)) = (present, &self.widgets) {
            if matches!(classify_selector(selector), SelectorKind::DateCell | SelectorKind::TravelField(_))
                && widgets.reveal_special(selector).await
            {
                console::log_1(&format!("locator: widget helper prepared '{}'", selector).into());
            }
        }

        let timeout = timeout_ms.unwrap_or(self.timeout_ms);
        match select(Box::pin(self.poll_until_visible(selector)), TimeoutFuture::new(timeout)).await {
            Either::Left((result, _)) => result,
            Either::Right(_) => Err(EngineError::not_found(
                selector,
                format!("Element '{}' not found after {}ms timeout", selector, timeout),
            )),
        }
    }

    async fn poll_until_visible(&self, selector: &str) -> Result<Element, EngineError> {
        let mut interval = IntervalStream::new(self.poll_interval_ms);
        loop {
            if let Some(element) = query(selector)? {
                if is_visible(&element) {
                    return Ok(element);
                }
                scroll_into_center(&element);
                TimeoutFuture::new(self.scroll_settle_ms).await;
                if is_visible(&element) {
                    return Ok(element);
                }
                if self.debug {
                    console::log_1(&format!("locator: '{}' present but not visible yet", selector).into());
                }
            }
            StreamExt::next(&mut interval).await;
        }
    }
}
