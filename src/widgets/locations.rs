use gloo_timers::future::TimeoutFuture;
use regex::Regex;
use std::sync::OnceLock;
use wasm_bindgen::JsCast;
use web_sys::{console, Element, HtmlElement};

use crate::config::EngineTimings;
use crate::error::EngineError;
use crate::handlers::{pointer_click, write_text};
use crate::locator::{elements_of, query_all_quiet, query_quiet, scroll_into_center};
use crate::visibility::is_visible;

const OPTION_ROWS: &str = "[role='option'], li[role='option']";
const OPTION_POLL_MS: u32 = 120;

static IATA: OnceLock<Option<Regex>> = OnceLock::new();
static PARENS: OnceLock<Option<Regex>> = OnceLock::new();
static ANY_SUFFIX: OnceLock<Option<Regex>> = OnceLock::new();

fn compiled(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Which end of the journey a field or suggestion list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelMode {
    Origin,
    Destination,
}

impl TravelMode {
    /// Anything mentioning "dest" is the destination; everything else the origin.
    pub fn parse(text: &str) -> Self {
        if text.to_lowercase().contains("dest") {
            TravelMode::Destination
        } else {
            TravelMode::Origin
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TravelMode::Origin => "origin",
            TravelMode::Destination => "destination",
        }
    }

    fn triggers(&self) -> &'static [&'static str] {
        match self {
            TravelMode::Origin => &[
                "#originInput-input",
                "[id='originInput-input']",
                "[aria-controls='originInput-menu']",
                "[data-testid*='origin']",
                "[aria-label='From']",
                "[aria-label^='From ']",
            ],
            TravelMode::Destination => &[
                "#destinationInput-input",
                "[id='destinationInput-input']",
                "[aria-controls='destinationInput-menu']",
                "[data-testid*='destination']",
                "[aria-label='To']",
                "[aria-label^='To ']",
            ],
        }
    }

    fn menu_roots(&self) -> &'static [&'static str] {
        match self {
            TravelMode::Origin => &[
                "#originInput-menu",
                "[id='originInput-menu']",
                "[role='listbox']",
                "ul[role='listbox']",
                "div[role='listbox']",
            ],
            TravelMode::Destination => &[
                "#destinationInput-menu",
                "[id='destinationInput-menu']",
                "[role='listbox']",
                "ul[role='listbox']",
                "div[role='listbox']",
            ],
        }
    }
}

/// Origin/destination input selectors, as opposed to their suggestion rows.
pub fn travel_mode_for_selector(selector: &str) -> Option<TravelMode> {
    let lower = selector.to_lowercase();
    if lower.contains("destinationinput") || lower.contains("destination") {
        Some(TravelMode::Destination)
    } else if lower.contains("origininput") || lower.contains("origin") {
        Some(TravelMode::Origin)
    } else {
        None
    }
}

pub fn collapse_spaces(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn norm_text(text: &str) -> String {
    collapse_spaces(text).to_lowercase()
}

/// `"Paris (CDG)"` -> `Some("CDG")`.
pub fn iata_from(text: &str) -> Option<String> {
    compiled(&IATA, r"\(([A-Za-z]{3})\)")?
        .captures(text)
        .map(|c| c[1].to_uppercase())
}

pub fn strip_parens(text: &str) -> String {
    match compiled(&PARENS, r"\([^)]*\)") {
        Some(re) => re.replace_all(text, "").trim().to_string(),
        None => text.trim().to_string(),
    }
}

/// Higher is better: hint +50, matching IATA code +40, exact text +30,
/// containment +20, city containment +15, "(Any)" +5 for city-only queries.
pub fn score_option(option_text: &str, wanted: &str, hint: Option<&str>) -> i32 {
    let text = norm_text(option_text);
    let want = norm_text(wanted);
    let want_city = norm_text(&strip_parens(wanted));
    let want_iata = iata_from(wanted);

    let mut score = 0;
    if let Some(hint) = hint {
        if text.contains(&norm_text(hint)) {
            score += 50;
        }
    }
    if let Some(code) = &want_iata {
        if iata_from(option_text).is_some() && text.contains(&format!("({})", code.to_lowercase())) {
            score += 40;
        }
    }
    if text == want {
        score += 30;
    }
    if text.contains(&want) {
        score += 20;
    }
    if text.contains(&want_city) {
        score += 15;
    }
    let any_suffix = compiled(&ANY_SUFFIX, r"(?i)\(any\)").map_or(false, |re| re.is_match(option_text));
    if want_iata.is_none() && any_suffix {
        score += 5;
    }
    score
}

/// Index of the highest scoring option; ties keep the earliest.
pub fn pick_best<S: AsRef<str>>(options: &[S], wanted: &str, hint: Option<&str>) -> Option<usize> {
    let mut best: Option<(usize, i32)> = None;
    for (i, option) in options.iter().enumerate() {
        let score = score_option(option.as_ref(), wanted, hint);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i)
}

fn option_text(option: &Element) -> String {
    let label = option
        .get_attribute("aria-label")
        .filter(|l| !l.trim().is_empty())
        .or_else(|| option.dyn_ref::<HtmlElement>().map(|h| h.inner_text()))
        .filter(|t| !t.trim().is_empty())
        .or_else(|| option.text_content())
        .unwrap_or_default();
    collapse_spaces(&label)
}

fn is_text_entry(element: &Element) -> bool {
    element.tag_name().eq_ignore_ascii_case("input") || element.get_attribute("role").as_deref() == Some("combobox")
}

pub fn find_input(mode: TravelMode) -> Option<Element> {
    for selector in mode.triggers() {
        if let Some(el) = query_quiet(selector) {
            if is_visible(&el) && is_text_entry(&el) {
                return Some(el);
            }
        }
    }
    None
}

/// Clicks the first visible trigger for the field and returns its input.
pub async fn open_field(mode: TravelMode) -> Option<Element> {
    for selector in mode.triggers() {
        if let Some(trigger) = query_quiet(selector).filter(|el| is_visible(el)) {
            scroll_into_center(&trigger);
            if let Err(e) = pointer_click(&trigger) {
                console::warn_1(&format!("locations: trigger click failed: {}", e).into());
            }
            TimeoutFuture::new(100).await;
            if let Some(input) = find_input(mode) {
                return Some(input);
            }
        }
    }
    find_input(mode)
}

pub fn visible_options(mode: TravelMode) -> Vec<Element> {
    for root_selector in mode.menu_roots() {
        let root = match query_quiet(root_selector) {
            Some(root) => root,
            None => continue,
        };
        let options: Vec<Element> = root
            .query_selector_all(OPTION_ROWS)
            .map(|nodes| elements_of(&nodes))
            .unwrap_or_default()
            .into_iter()
            .filter(|el| is_visible(el))
            .collect();
        if !options.is_empty() {
            return options;
        }
    }
    query_all_quiet(OPTION_ROWS).into_iter().filter(|el| is_visible(el)).collect()
}

async fn wait_for_options(mode: TravelMode, timeout_ms: u32) -> Vec<Element> {
    let started = js_sys::Date::now();
    let mut options = visible_options(mode);
    while options.is_empty() && js_sys::Date::now() - started < timeout_ms as f64 {
        TimeoutFuture::new(OPTION_POLL_MS).await;
        options = visible_options(mode);
    }
    options
}

/// Types `text` into `input`, the field for `mode`, and clicks the best suggestion.
pub async fn select_location(
    mode: TravelMode,
    input: &Element,
    text: &str,
    hint: Option<&str>,
    timings: &EngineTimings,
) -> Result<(), EngineError> {
    scroll_into_center(input);
    write_text(input, "")?;
    write_text(input, text)?;
    TimeoutFuture::new(150).await;

    let mut options = wait_for_options(mode, timings.location_timeout_ms).await;
    if options.is_empty() {
        // A trailing keystroke sometimes wakes up the suggestion list.
        write_text(input, &format!("{} ", text))?;
        TimeoutFuture::new(200).await;
        options = visible_options(mode);
    }
    if options.is_empty() {
        return Err(EngineError::not_found(
            mode.as_str(),
            format!("No suggestions became visible for {}", mode.as_str()),
        ));
    }

    let texts: Vec<String> = options.iter().map(option_text).collect();
    let choice = pick_best(&texts, text, hint).unwrap_or(0);
    console::log_1(&format!("locations: picking '{}' for {} '{}'", texts[choice], mode.as_str(), text).into());

    let option = &options[choice];
    scroll_into_center(option);
    pointer_click(option)?;
    TimeoutFuture::new(150).await;
    Ok(())
}
