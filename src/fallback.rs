use regex::Regex;
use std::sync::OnceLock;
use wasm_bindgen::JsCast;
use web_sys::{console, Element, HtmlElement};

use crate::handlers::pointer_click;
use crate::locator::query_all_quiet;
use crate::visibility::is_visible;
use crate::widgets::locations::collapse_spaces;

const TRIP_CONTROLS: &str = "input[type='radio'], [role='radio'], [role='tab'], button, label";
const TEXT_CONTROLS: &str = "button, a, label, [role='button'], [role='link'], [role='tab'], [role='radio'], \
                             [role='option'], input[type='submit'], input[type='button']";

static TEXT_PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
static TRIP_PATTERNS: OnceLock<Vec<(Option<TripMode>, Regex)>> = OnceLock::new();

/// Trip type toggles found on flight search forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripMode {
    Return,
    OneWay,
    MultiCity,
}

impl TripMode {
    fn labels(&self) -> &'static [&'static str] {
        match self {
            TripMode::Return => &["return", "round trip", "round-trip"],
            TripMode::OneWay => &["one way", "one-way", "oneway"],
            TripMode::MultiCity => &["multi-city", "multi city", "multicity"],
        }
    }
}

/// The trip type a selector is trying to reach, if it names one as a whole
/// word ("Return to cart" and "multiselect" do not count).
pub fn trip_mode_hint(selector: &str) -> Option<TripMode> {
    let lower = selector.to_lowercase();
    if lower.contains("date") {
        return None;
    }
    let patterns = TRIP_PATTERNS.get_or_init(|| {
        [
            (Some(TripMode::OneWay), r"(?:^|[^a-z])one[\s_-]?way(?:[^a-z]|$)"),
            (Some(TripMode::MultiCity), r"(?:^|[^a-z])multi[\s_-]?cit(?:y|ies)(?:[^a-z]|$)"),
            (Some(TripMode::Return), r"(?:^|[^a-z])round[\s_-]?trip(?:[^a-z]|$)"),
            (None, r"(?:^|[^a-z])return[\s_-]+to(?:[^a-z]|$)"),
            (Some(TripMode::Return), r"(?:^|[^a-z])return(?:[^a-z]|$)"),
        ]
        .iter()
        .filter_map(|(mode, p)| Regex::new(p).ok().map(|re| (*mode, re)))
        .collect()
    });
    // First matching pattern decides; a `None` entry vetoes the rest.
    patterns
        .iter()
        .find(|(_, re)| re.is_match(&lower))
        .and_then(|(mode, _)| *mode)
}

fn text_patterns() -> &'static [Regex] {
    TEXT_PATTERNS.get_or_init(|| {
        [
            r#"(?:aria-label|title|value|alt|placeholder)\s*[*^$|~]?=\s*["'“”‘’]([^"'“”‘’]+)["'“”‘’]"#,
            r#"text\(\)\s*[,=]\s*["']([^"']+)["']"#,
            r#"contains\(\s*\.\s*,\s*["']([^"']+)["']"#,
            r#":(?:contains|has-text)\(\s*["']([^"']+)["']"#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// The human-readable text embedded in a selector: attribute values such as
/// aria-label or title, or the literal in an XPath text() test.
pub fn text_hint(selector: &str) -> Option<String> {
    text_patterns()
        .iter()
        .filter_map(|re| re.captures(selector))
        .map(|c| collapse_spaces(&c[1]))
        .find(|t| !t.is_empty())
}

fn labels_of(element: &Element) -> Vec<String> {
    let mut labels = Vec::new();
    for attribute in ["aria-label", "value", "title"] {
        if let Some(value) = element.get_attribute(attribute) {
            labels.push(value);
        }
    }
    if let Some(html) = element.dyn_ref::<HtmlElement>() {
        labels.push(html.inner_text());
    }
    labels
        .iter()
        .map(|l| collapse_spaces(l).to_lowercase())
        .filter(|l| !l.is_empty())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LabelMatch {
    Exact,
    Contains,
}

pub fn match_label(label: &str, needle: &str) -> Option<LabelMatch> {
    let label = collapse_spaces(label).to_lowercase();
    let needle = collapse_spaces(needle).to_lowercase();
    if needle.is_empty() {
        None
    } else if label == needle {
        Some(LabelMatch::Exact)
    } else if label.contains(&needle) {
        Some(LabelMatch::Contains)
    } else {
        None
    }
}

/// First visible candidate whose label matches any needle, exact matches first.
fn best_candidate(candidates: &str, needles: &[&str]) -> Option<Element> {
    let visible: Vec<(Element, Vec<String>)> = query_all_quiet(candidates)
        .into_iter()
        .filter(|el| is_visible(el))
        .map(|el| {
            let labels = labels_of(&el);
            (el, labels)
        })
        .collect();
    for wanted in [LabelMatch::Exact, LabelMatch::Contains] {
        let hit = visible.iter().find(|(_, labels)| {
            labels
                .iter()
                .any(|label| needles.iter().any(|n| match_label(label, n) == Some(wanted)))
        });
        if let Some((element, _)) = hit {
            return Some(element.clone());
        }
    }
    None
}

fn click(element: &Element, what: &str) -> bool {
    match pointer_click(element) {
        Ok(()) => true,
        Err(e) => {
            console::warn_1(&format!("fallback: clicking {} failed: {}", what, e).into());
            false
        }
    }
}

pub fn click_trip_mode(mode: TripMode) -> bool {
    match best_candidate(TRIP_CONTROLS, mode.labels()) {
        Some(control) => click(&control, &format!("{:?} trip control", mode)),
        None => false,
    }
}

pub fn click_by_text(text: &str) -> bool {
    match best_candidate(TEXT_CONTROLS, &[text]) {
        Some(control) => click(&control, &format!("'{}'", text)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::document;
    use std::cell::Cell;
    use std::rc::Rc;
    use wasm_bindgen::closure::Closure;
    use wasm_bindgen_test::*;

    wasm_bindgen_test_configure!(run_in_browser);

    #[test]
    fn test_trip_mode_hint() {
        assert_eq!(trip_mode_hint("#trip-type-oneway"), Some(TripMode::OneWay));
        assert_eq!(trip_mode_hint("input[value='Return']"), Some(TripMode::Return));
        assert_eq!(trip_mode_hint("[data-testid='multi-city-tab']"), Some(TripMode::MultiCity));
        assert_eq!(trip_mode_hint("#return-date"), None);
        assert_eq!(trip_mode_hint("#search"), None);
        assert_eq!(trip_mode_hint("label[for='round-trip']"), Some(TripMode::Return));
        assert_eq!(trip_mode_hint("[aria-label='Multi city']"), Some(TripMode::MultiCity));
    }

    #[test]
    fn test_trip_mode_hint_needs_whole_words() {
        assert_eq!(trip_mode_hint("#multiselect"), None);
        assert_eq!(trip_mode_hint("[aria-label='Return to cart']"), None);
        assert_eq!(trip_mode_hint("#returns-policy"), None);
        assert_eq!(trip_mode_hint("#someoneway"), None);
    }

    #[test]
    fn test_text_hint() {
        assert_eq!(text_hint("button[aria-label='Search flights']"), Some("Search flights".to_string()));
        assert_eq!(text_hint("[title*=“Next”]"), Some("Next".to_string()));
        assert_eq!(text_hint("xpath://button[text()='Continue']"), Some("Continue".to_string()));
        assert_eq!(
            text_hint("xpath://a[contains(text(), 'Sign in')]"),
            Some("Sign in".to_string())
        );
        assert_eq!(text_hint("xpath://span[contains(., 'Accept all')]"), Some("Accept all".to_string()));
        assert_eq!(text_hint("#submit-button"), None);
    }

    #[test]
    fn test_match_label() {
        assert_eq!(match_label("Search  flights", "search flights"), Some(LabelMatch::Exact));
        assert_eq!(match_label("Search flights now", "search flights"), Some(LabelMatch::Contains));
        assert_eq!(match_label("Search", "search flights"), None);
        assert_eq!(match_label("anything", " "), None);
    }

    #[wasm_bindgen_test]
    fn test_click_by_text_prefers_exact_label() {
        let document = document().unwrap();
        let body = document.body().unwrap();
        let clicked = Rc::new(Cell::new(""));

        let mut buttons = Vec::new();
        let mut listeners = Vec::new();
        for (label, tag) in [("Search flights and hotels", "long"), ("Search flights", "exact")] {
            let button = document.create_element("button").unwrap();
            button.set_text_content(Some(label));
            let record = clicked.clone();
            let listener = Closure::<dyn FnMut()>::new(move || record.set(tag));
            button
                .add_event_listener_with_callback("click", listener.as_ref().unchecked_ref())
                .unwrap();
            body.prepend_with_node_1(&button).unwrap();
            buttons.push(button);
            listeners.push(listener);
        }

        assert!(click_by_text("search flights"));
        assert_eq!(clicked.get(), "exact");
        assert!(!click_by_text("no such control anywhere"));

        for button in buttons {
            button.remove();
        }
    }
}
