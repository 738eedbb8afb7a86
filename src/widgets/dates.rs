use gloo_timers::future::TimeoutFuture;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use wasm_bindgen::JsCast;
use web_sys::{console, Element, HtmlElement};

use crate::config::EngineTimings;
use crate::locator::{query_all_quiet, query_quiet, scroll_into_center};
use crate::visibility::is_visible;

const NEXT_MONTH: &str = "[aria-label*='Next month']";
const PREVIOUS_MONTH: &str = "[aria-label*='Previous month']";

static SINGLE_DATE_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
static ARIA_LABEL_VALUE: OnceLock<Option<Regex>> = OnceLock::new();
static ARIA_LABEL_TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
static YEAR: OnceLock<Option<Regex>> = OnceLock::new();
static YEAR_IN_TEXT: OnceLock<Option<Regex>> = OnceLock::new();
static MONTH_NAME: OnceLock<Option<Regex>> = OnceLock::new();
static DAY_NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
static MONTH_HEADER: OnceLock<Option<Regex>> = OnceLock::new();
static FORMAT_CHARS: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            console::error_1(&format!("dates: bad pattern {}: {}", pattern, e).into());
            None
        }
    })
    .as_ref()
}

/// Month and year of a calendar page. Months are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonthYear {
    pub year: i32,
    pub month: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

pub fn current_year() -> i32 {
    js_sys::Date::new_0().get_full_year() as i32
}

/// Every `aria-label*="..."` value in the selector, any quote style.
pub fn aria_label_values(selector: &str) -> Vec<String> {
    match compiled(&ARIA_LABEL_VALUE, r#"aria-label\*=\s*["'“”‘’]([^"'“”‘’]*)["'“”‘’]"#) {
        Some(re) => re.captures_iter(selector).map(|c| c[1].to_string()).collect(),
        None => Vec::new(),
    }
}

/// `[aria-label*='September 15, 2025']`, day-first variants, or several
/// aria-label tokens that together name a month and a day.
pub fn is_date_selector(selector: &str) -> bool {
    let single = compiled(
        &SINGLE_DATE_TOKEN,
        r#"(?i)^\[aria-label\*=["'“”‘’](?:[a-z]+\s+\d{1,2}|\d{1,2}\s+[a-z]+)(?:,\s*|\s+)\d{4}\.?["'“”‘’]\]$"#,
    );
    if single.map_or(false, |re| re.is_match(selector.trim())) {
        return true;
    }

    let values = aria_label_values(selector);
    if values.is_empty() {
        return false;
    }
    let joined = values.join(" ");
    let has_month = compiled(&MONTH_NAME, MONTH_PATTERN).map_or(false, |re| re.is_match(&joined));
    let has_day = compiled(&DAY_NUMBER, r"\b\d{1,2}\b").map_or(false, |re| re.is_match(&joined));
    has_month && has_day
}

const MONTH_PATTERN: &str = r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|jun(?:e)?|jul(?:y)?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\b";

fn month_index(word: &str) -> Option<u32> {
    let lower = word.to_lowercase();
    let key = if lower == "sept" { "sept" } else { lower.get(..3).unwrap_or(&lower) };
    let index = match key {
        "jan" => 0,
        "feb" => 1,
        "mar" => 2,
        "apr" => 3,
        "may" => 4,
        "jun" => 5,
        "jul" => 6,
        "aug" => 7,
        "sep" | "sept" => 8,
        "oct" => 9,
        "nov" => 10,
        "dec" => 11,
        _ => return None,
    };
    Some(index)
}

/// Appends a year token when the selector names none, and lifts years in
/// the past up to `min_year`.
pub fn normalize_date_selector(selector: &str, min_year: i32) -> String {
    let mut normalized = selector.to_string();
    let has_year = compiled(&YEAR, r"\b(\d{4})\b").map_or(false, |re| re.is_match(&normalized));
    if !has_year {
        normalized.push_str(&format!("[aria-label*=\"{}\"]", min_year));
    }

    let (token, year) = match (
        compiled(&ARIA_LABEL_TOKEN, r#"(aria-label\*=\s*["'“”‘’])([^"'“”‘’]*)(["'“”‘’])"#),
        compiled(&YEAR, r"\b(\d{4})\b"),
    ) {
        (Some(token), Some(year)) => (token, year),
        _ => return normalized,
    };
    token
        .replace_all(&normalized, |caps: &Captures| {
            let value = year.replace_all(&caps[2], |y: &Captures| match y[1].parse::<i32>() {
                Ok(found) if (1900..min_year).contains(&found) => min_year.to_string(),
                _ => y[1].to_string(),
            });
            format!("{}{}{}", &caps[1], value, &caps[3])
        })
        .into_owned()
}

/// Month and year named by an aria-label, a date selector, or several
/// aria-label tokens taken together.
pub fn month_year_from_aria_label(input: &str) -> Option<MonthYear> {
    let values = aria_label_values(input);
    let raw = if values.is_empty() { input.to_string() } else { values.join(" ") };

    let spaced = match compiled(&FORMAT_CHARS, r"[\p{Cf}\x{00A0}\x{2007}\x{202F}]") {
        Some(re) => re.replace_all(&raw, " ").into_owned(),
        None => raw,
    };
    let text = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let month = compiled(&MONTH_NAME, MONTH_PATTERN)?
        .captures(&text)
        .and_then(|c| month_index(&c[1]))?;
    let year = compiled(&YEAR_IN_TEXT, r"(?:^|\D)(\d{4})(?:\D|$)")?
        .captures(&text)
        .and_then(|c| c[1].parse::<i32>().ok())
        .filter(|y| *y >= 1900)?;
    Some(MonthYear { year, month })
}

/// Forward when the target is not before the earliest month on screen.
pub fn direction_towards(target: MonthYear, visible_months: &[MonthYear]) -> Option<Direction> {
    let earliest = visible_months.iter().min()?;
    Some(if target >= *earliest { Direction::Next } else { Direction::Previous })
}

fn visible_month_headers() -> Vec<MonthYear> {
    let header = match compiled(&MONTH_HEADER, r"\b[A-Za-z]+\s+\d{4}\b") {
        Some(re) => re,
        None => return Vec::new(),
    };
    query_all_quiet("[aria-label]")
        .iter()
        .filter_map(|el| el.get_attribute("aria-label"))
        .filter(|label| header.is_match(label))
        .filter_map(|label| month_year_from_aria_label(&label))
        .collect()
}

async fn reveal(element: &Element, settle_ms: u32) -> bool {
    if is_visible(element) {
        return true;
    }
    scroll_into_center(element);
    TimeoutFuture::new(settle_ms).await;
    is_visible(element)
}

/// Pages the open date picker until the cell for `selector` is on screen.
pub async fn scroll_to_date(selector: &str, timings: &EngineTimings) -> Option<Element> {
    let selector = normalize_date_selector(selector, current_year());
    console::log_1(&format!("dates: looking for {}", selector).into());

    if let Some(target) = query_quiet(&selector) {
        if reveal(&target, 500).await {
            return Some(target);
        }
        console::warn_1(&format!("dates: '{}' present but not visible after scrolling", selector).into());
    }

    let target_month = match month_year_from_aria_label(&selector) {
        Some(month) => month,
        None => {
            console::error_1(&format!("dates: no month/year in '{}'", selector).into());
            return None;
        }
    };
    let direction = direction_towards(target_month, &visible_month_headers()).unwrap_or(Direction::Next);

    for attempt in 0..timings.date_navigation_attempts {
        if let Some(hit) = query_quiet(&selector) {
            if reveal(&hit, 300).await {
                console::log_1(&format!("dates: found target after {} navigation click(s)", attempt).into());
                return Some(hit);
            }
        }

        let next = query_quiet(NEXT_MONTH);
        let previous = query_quiet(PREVIOUS_MONTH);
        let button = match direction {
            Direction::Next => next.or(previous),
            Direction::Previous => previous.or(next),
        };
        let button = match button.and_then(|b| b.dyn_into::<HtmlElement>().ok()) {
            Some(button) => button,
            None => {
                console::warn_1(&"dates: calendar controls not found, is the picker open?".into());
                return None;
            }
        };
        button.click();
        TimeoutFuture::new(timings.date_navigation_wait_ms).await;
    }

    if let Some(target) = query_quiet(&selector) {
        if reveal(&target, 300).await {
            return Some(target);
        }
    }
    console::warn_1(
        &format!("dates: gave up after {} navigation attempts", timings.date_navigation_attempts).into(),
    );
    None
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

    fn quick_timings(attempts: u32) -> EngineTimings {
        EngineTimings {
            date_navigation_attempts: attempts,
            date_navigation_wait_ms: 20,
            ..EngineTimings::default()
        }
    }

    fn next_month_button(clicks: Rc<Cell<u32>>, reveal_after: u32) -> (Element, Closure<dyn FnMut()>) {
        let document = document().unwrap();
        let button = document.create_element("button").unwrap();
        button.set_attribute("aria-label", "Next month").unwrap();
        let on_click = Closure::<dyn FnMut()>::new(move || {
            clicks.set(clicks.get() + 1);
            if clicks.get() == reveal_after {
                let document = crate::locator::document().unwrap();
                let cell = document.create_element("button").unwrap();
                cell.set_attribute("aria-label", "Saturday, October 24, 2099").unwrap();
                cell.set_attribute("data-calendar-cell", "").unwrap();
                document.body().unwrap().prepend_with_node_1(&cell).unwrap();
            }
        });
        button
            .add_event_listener_with_callback("click", on_click.as_ref().unchecked_ref())
            .unwrap();
        document.body().unwrap().prepend_with_node_1(&button).unwrap();
        (button, on_click)
    }

    fn remove_cells() {
        for cell in query_all_quiet("[data-calendar-cell]") {
            cell.remove();
        }
    }

    #[test]
    fn test_is_date_selector() {
        assert!(is_date_selector("[aria-label*='September 15, 2025']"));
        assert!(is_date_selector("[aria-label*=\"15 September 2025\"]"));
        assert!(is_date_selector("[aria-label*='October 22'][aria-label*='2025']"));
        assert!(is_date_selector("[aria-label*='Oct 3']"));
        assert!(!is_date_selector("[aria-label*='Next month']"));
        assert!(!is_date_selector("#depart-date"));
        assert!(!is_date_selector("[aria-label*='May 2025']"));
    }

    #[test]
    fn test_normalize_appends_missing_year() {
        assert_eq!(
            normalize_date_selector("[aria-label*='October 22']", 2026),
            "[aria-label*='October 22'][aria-label*=\"2026\"]"
        );
    }

    #[test]
    fn test_normalize_bumps_past_years_only() {
        assert_eq!(
            normalize_date_selector("[aria-label*='October 22, 2024']", 2026),
            "[aria-label*='October 22, 2026']"
        );
        assert_eq!(
            normalize_date_selector("[aria-label*=’March 1, 2027’]", 2026),
            "[aria-label*=’March 1, 2027’]"
        );
    }

    #[test]
    fn test_month_year_from_aria_label() {
        assert_eq!(
            month_year_from_aria_label("[aria-label*='October 22'][aria-label*='2025']"),
            Some(MonthYear { year: 2025, month: 9 })
        );
        assert_eq!(
            month_year_from_aria_label("Sunday,\u{00A0}5 Jan 2026"),
            Some(MonthYear { year: 2026, month: 0 })
        );
        assert_eq!(
            month_year_from_aria_label("[aria-label*='15 Sept 2025']"),
            Some(MonthYear { year: 2025, month: 8 })
        );
        assert_eq!(month_year_from_aria_label("[aria-label*='October 22']"), None);
        assert_eq!(month_year_from_aria_label("no date here 2025"), None);
    }

    #[test]
    fn test_direction_towards() {
        let shown = [MonthYear { year: 2025, month: 5 }, MonthYear { year: 2025, month: 4 }];
        assert_eq!(direction_towards(MonthYear { year: 2025, month: 9 }, &shown), Some(Direction::Next));
        assert_eq!(direction_towards(MonthYear { year: 2025, month: 4 }, &shown), Some(Direction::Next));
        assert_eq!(
            direction_towards(MonthYear { year: 2024, month: 11 }, &shown),
            Some(Direction::Previous)
        );
        assert_eq!(direction_towards(MonthYear { year: 2025, month: 1 }, &[]), None);
    }

    #[wasm_bindgen_test]
    async fn test_scroll_to_date_pages_forward_until_cell_renders() {
        let clicks = Rc::new(Cell::new(0));
        let (button, _listener) = next_month_button(clicks.clone(), 2);

        let found = scroll_to_date("[aria-label*='October 24, 2099']", &quick_timings(5)).await;

        assert_eq!(
            found.and_then(|cell| cell.get_attribute("aria-label")).as_deref(),
            Some("Saturday, October 24, 2099")
        );
        assert_eq!(clicks.get(), 2);
        button.remove();
        remove_cells();
    }

    #[wasm_bindgen_test]
    async fn test_scroll_to_date_gives_up_after_attempts() {
        let clicks = Rc::new(Cell::new(0));
        let (button, _listener) = next_month_button(clicks.clone(), u32::MAX);

        let found = scroll_to_date("[aria-label*='March 3, 2099']", &quick_timings(3)).await;

        assert!(found.is_none());
        assert_eq!(clicks.get(), 3);
        button.remove();
    }

    #[wasm_bindgen_test]
    async fn test_scroll_to_date_stops_without_calendar_controls() {
        let found = scroll_to_date("[aria-label*='March 3, 2099']", &quick_timings(30)).await;
        assert!(found.is_none());
    }
}
