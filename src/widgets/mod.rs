//! Site widgets that generic polling cannot drive on its own: calendar grids
//! that only render one month at a time and origin/destination pickers whose
//! options appear after typing.

pub mod dates;
pub mod locations;

use futures::future::{FutureExt, LocalBoxFuture};
use web_sys::{console, Element};

use crate::config::EngineTimings;
use crate::locator::{classify_selector, SelectorKind};
use locations::TravelMode;

/// Fast paths the locator and executor consult before falling back to
/// generic polling.
pub trait WidgetHelper {
    /// Drives the page until a special target (date cell, travel field) can
    /// render. True when the helper found what it was looking for; the caller
    /// still resolves the selector itself.
    fn reveal_special<'a>(&'a self, selector: &'a str) -> LocalBoxFuture<'a, bool>;

    /// Types `text` into `input` and picks the best suggestion. True when a
    /// suggestion was clicked.
    fn select_location<'a>(&'a self, mode: TravelMode, input: &'a Element, text: &'a str) -> LocalBoxFuture<'a, bool>;
}

/// Date-grid and location-autocomplete helpers for travel search pages.
pub struct SiteWidgets {
    timings: EngineTimings,
}

impl SiteWidgets {
    pub fn new(timings: &EngineTimings) -> Self {
        SiteWidgets {
            timings: timings.clone(),
        }
    }
}

impl WidgetHelper for SiteWidgets {
    fn reveal_special<'a>(&'a self, selector: &'a str) -> LocalBoxFuture<'a, bool> {
        async move {
            match classify_selector(selector) {
                SelectorKind::DateCell => dates::scroll_to_date(selector, &self.timings).await.is_some(),
                SelectorKind::TravelField(mode) => locations::open_field(mode).await.is_some(),
                _ => false,
            }
        }
        .boxed_local()
    }

    fn select_location<'a>(&'a self, mode: TravelMode, input: &'a Element, text: &'a str) -> LocalBoxFuture<'a, bool> {
        async move {
            match locations::select_location(mode, input, text, None, &self.timings).await {
                Ok(()) => true,
                Err(e) => {
                    console::warn_1(&format!("widgets: location selection failed: {}", e).into());
                    false
                }
            }
        }
        .boxed_local()
    }
}
