use web_sys::{console, Element};

/// Viewport size in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

/// The parts of a `DOMRect` the oracle looks at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub width: f64,
    pub height: f64,
}

/// False when the computed style hides the node outright.
pub fn style_allows_display(display: &str, visibility: &str, opacity: &str) -> bool {
    if display.trim() == "none" || visibility.trim() == "hidden" {
        return false;
    }
    match opacity.trim().parse::<f64>() {
        Ok(value) => value != 0.0,
        Err(_) => true, // empty or unparsable opacity means the default of 1
    }
}

/// Positive area and any overlap with the viewport.
pub fn intersects_viewport(bounds: &Bounds, viewport: &Viewport) -> bool {
    bounds.width > 0.0
        && bounds.height > 0.0
        && bounds.top < viewport.height
        && bounds.left < viewport.width
        && bounds.bottom > 0.0
        && bounds.right > 0.0
}

/// `innerWidth/innerHeight`, falling back to the root element's client size.
pub fn viewport() -> Option<Viewport> {
    let window = web_sys::window()?;
    let inner_width = window.inner_width().ok().and_then(|v| v.as_f64()).filter(|w| *w > 0.0);
    let inner_height = window.inner_height().ok().and_then(|v| v.as_f64()).filter(|h| *h > 0.0);
    let root = window.document().and_then(|d| d.document_element());

    let width = inner_width.or_else(|| root.as_ref().map(|r| r.client_width() as f64))?;
    let height = inner_height.or_else(|| root.as_ref().map(|r| r.client_height() as f64))?;
    Some(Viewport { width, height })
}

pub fn bounds_of(element: &Element) -> Bounds {
    let rect = element.get_bounding_client_rect();
    Bounds {
        top: rect.top(),
        left: rect.left(),
        bottom: rect.bottom(),
        right: rect.right(),
        width: rect.width(),
        height: rect.height(),
    }
}

/// True iff the element is rendered, has area, and intersects the viewport.
pub fn is_visible(element: &Element) -> bool {
    let window = match web_sys::window() {
        Some(w) => w,
        None => return false,
    };
    let style = match window.get_computed_style(element) {
        Ok(Some(style)) => style,
        Ok(None) => return false,
        Err(e) => {
            console::warn_1(&format!("visibility: getComputedStyle failed: {:?}", e).into());
            return false;
        }
    };
    let display = style.get_property_value("display").unwrap_or_default();
    let visibility = style.get_property_value("visibility").unwrap_or_default();
    let opacity = style.get_property_value("opacity").unwrap_or_default();
    if !style_allows_display(&display, &visibility, &opacity) {
        return false;
    }

    match viewport() {
        Some(vp) => intersects_viewport(&bounds_of(element), &vp),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasm_bindgen::JsCast;
    use wasm_bindgen_test::*;
    use web_sys::HtmlElement;

    wasm_bindgen_test_configure!(run_in_browser);

    const VIEWPORT: Viewport = Viewport { width: 800.0, height: 600.0 };

    fn rect(top: f64, left: f64, width: f64, height: f64) -> Bounds {
        Bounds { top, left, bottom: top + height, right: left + width, width, height }
    }

    #[test]
    fn test_style_allows_display() {
        assert!(style_allows_display("block", "visible", "1"));
        assert!(style_allows_display("inline", "visible", ""));
        assert!(!style_allows_display("none", "visible", "1"));
        assert!(!style_allows_display("block", "hidden", "1"));
        assert!(!style_allows_display("block", "visible", "0"));
        assert!(style_allows_display("block", "visible", "0.2"));
    }

    #[test]
    fn test_intersects_viewport() {
        assert!(intersects_viewport(&rect(10.0, 10.0, 100.0, 20.0), &VIEWPORT));
        // zero area
        assert!(!intersects_viewport(&rect(10.0, 10.0, 0.0, 20.0), &VIEWPORT));
        assert!(!intersects_viewport(&rect(10.0, 10.0, 100.0, 0.0), &VIEWPORT));
        // entirely below / right of / above the viewport
        assert!(!intersects_viewport(&rect(600.0, 10.0, 100.0, 20.0), &VIEWPORT));
        assert!(!intersects_viewport(&rect(10.0, 800.0, 100.0, 20.0), &VIEWPORT));
        assert!(!intersects_viewport(&rect(-40.0, 10.0, 100.0, 20.0), &VIEWPORT));
        // partially overlapping the top edge still counts
        assert!(intersects_viewport(&rect(-10.0, 10.0, 100.0, 20.0), &VIEWPORT));
    }

    fn mount(style: &str) -> HtmlElement {
        let document = web_sys::window().unwrap().document().unwrap();
        let el = document.create_element("div").unwrap().dyn_into::<HtmlElement>().unwrap();
        el.set_text_content(Some("visibility check"));
        el.set_attribute("style", style).unwrap();
        document.body().unwrap().prepend_with_node_1(&el).unwrap();
        el
    }

    #[wasm_bindgen_test]
    fn test_is_visible_for_plain_block() {
        let el = mount("width: 50px; height: 20px;");
        assert!(is_visible(&el));
        el.remove();
    }

    #[wasm_bindgen_test]
    fn test_is_visible_rejects_hidden_styles() {
        for style in [
            "display: none;",
            "visibility: hidden; width: 50px; height: 20px;",
            "opacity: 0; width: 50px; height: 20px;",
        ] {
            let el = mount(style);
            assert!(!is_visible(&el), "style '{}' should be invisible", style);
            el.remove();
        }
    }

    #[wasm_bindgen_test]
    fn test_is_visible_rejects_offscreen() {
        let el = mount("position: absolute; top: -5000px; left: 0; width: 50px; height: 20px;");
        assert!(!is_visible(&el));
        el.remove();
    }
}
