//! DOM interrogation and interaction helpers
//!
//! Everything goes through `evaluate` with small self-contained scripts:
//! chromiumoxide exposes CSS selectors only, and script results serialize
//! cleanly to JSON for the Rust side to parse.

use serde::Deserialize;
use tracing::debug;

use crate::driver::{BrowserError, HiddenBrowser};

/// Normalized descriptor of one form input
#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default, rename = "type")]
    pub input_type: String,
    #[serde(default)]
    pub tag: String,
}

impl FieldDescriptor {
    /// All descriptor text, lowercased, for keyword matching
    pub fn haystack(&self) -> String {
        format!("{} {} {}", self.name, self.id, self.placeholder).to_lowercase()
    }

    /// CSS selector addressing this input
    pub fn selector(&self) -> String {
        if !self.id.is_empty() {
            format!("#{}", self.id)
        } else if !self.name.is_empty() {
            format!("{}[name=\"{}\"]", self.tag, self.name)
        } else {
            self.tag.clone()
        }
    }
}

/// A harvested link with its anchor text
#[derive(Debug, Clone, Deserialize)]
pub struct PageLink {
    pub href: String,
    #[serde(default)]
    pub text: String,
}

/// Scroll to the bottom in steps to trigger lazy loading
pub async fn scroll_full_height(browser: &HiddenBrowser) -> Result<(), BrowserError> {
    for _ in 0..6 {
        let at_bottom = browser
            .eval_bool(
                r#"(() => {
                    window.scrollBy(0, window.innerHeight);
                    return window.innerHeight + window.scrollY
                        >= document.body.scrollHeight - 10;
                })()"#,
            )
            .await?;
        if at_bottom {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    }
    Ok(())
}

/// Click the first visible element whose text matches any of the words
///
/// Returns the matched word, or `None` when nothing clickable matched.
pub async fn click_visible_text(
    browser: &HiddenBrowser,
    words: &[&str],
) -> Result<Option<String>, BrowserError> {
    let words_json =
        serde_json::to_string(words).map_err(|e| BrowserError::Script(e.to_string()))?;
    let js = format!(
        r#"(() => {{
            const words = {words_json};
            const candidates = document.querySelectorAll(
                'a, button, input[type="submit"], input[type="button"], [role="button"]');
            for (const el of candidates) {{
                if (el.offsetParent === null) continue;
                const text = ((el.innerText || '') + ' ' + (el.value || '')).toLowerCase();
                for (const w of words) {{
                    if (text.includes(w.toLowerCase())) {{
                        el.click();
                        return w;
                    }}
                }}
            }}
            return null;
        }})()"#,
    );
    let value = browser.eval(&js).await?;
    Ok(value.as_str().map(|s| s.to_string()))
}

/// Descriptors for every input, select, and textarea on the page
pub async fn form_fields(browser: &HiddenBrowser) -> Result<Vec<FieldDescriptor>, BrowserError> {
    let value = browser
        .eval(
            r#"(() => {
                const out = [];
                for (const el of document.querySelectorAll('input, select, textarea')) {
                    out.push({
                        name: el.name || '',
                        id: el.id || '',
                        placeholder: el.placeholder || '',
                        type: el.type || '',
                        tag: el.tagName.toLowerCase(),
                    });
                }
                return out;
            })()"#,
        )
        .await?;
    serde_json::from_value(value).map_err(|e| BrowserError::Script(e.to_string()))
}

/// Set an input's value and fire the events frameworks listen for
pub async fn fill_input(
    browser: &HiddenBrowser,
    selector: &str,
    value: &str,
) -> Result<bool, BrowserError> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            if (!el) return false;
            el.focus();
            el.value = {val};
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return true;
        }})()"#,
        sel = serde_json::to_string(selector).map_err(|e| BrowserError::Script(e.to_string()))?,
        val = serde_json::to_string(value).map_err(|e| BrowserError::Script(e.to_string()))?,
    );
    browser.eval_bool(&js).await
}

/// Submit the form containing the given element
pub async fn submit_form_of(
    browser: &HiddenBrowser,
    selector: &str,
) -> Result<bool, BrowserError> {
    let js = format!(
        r#"(() => {{
            const el = document.querySelector({sel});
            const form = el ? el.closest('form') : document.querySelector('form');
            if (!form) return false;
            if (form.requestSubmit) form.requestSubmit(); else form.submit();
            return true;
        }})()"#,
        sel = serde_json::to_string(selector).map_err(|e| BrowserError::Script(e.to_string()))?,
    );
    browser.eval_bool(&js).await
}

/// Find a CAPTCHA image; tags it and returns a stable selector
pub async fn find_captcha_image(
    browser: &HiddenBrowser,
) -> Result<Option<String>, BrowserError> {
    let found = browser
        .eval_bool(
            r#"(() => {
                for (const img of document.querySelectorAll('img')) {
                    const src = (img.src || '').toLowerCase();
                    const alt = (img.alt || '').toLowerCase();
                    if (src.includes('captcha') || alt.includes('captcha')) {
                        img.setAttribute('data-magpie-captcha', '1');
                        return true;
                    }
                }
                return false;
            })()"#,
        )
        .await?;
    Ok(found.then(|| "img[data-magpie-captcha]".to_string()))
}

/// Find the input field nearest in spirit to the CAPTCHA; tag and return it
pub async fn find_captcha_input(
    browser: &HiddenBrowser,
) -> Result<Option<String>, BrowserError> {
    let found = browser
        .eval_bool(
            r#"(() => {
                for (const el of document.querySelectorAll('input')) {
                    const hay = ((el.name || '') + (el.id || '') + (el.placeholder || ''))
                        .toLowerCase();
                    if (hay.includes('captcha') || hay.includes('security code')) {
                        el.setAttribute('data-magpie-captcha-input', '1');
                        return true;
                    }
                }
                return false;
            })()"#,
        )
        .await?;
    Ok(found.then(|| "input[data-magpie-captcha-input]".to_string()))
}

/// Detect a "click the red circle" style visual challenge
pub async fn has_visual_challenge(browser: &HiddenBrowser) -> Result<bool, BrowserError> {
    browser
        .eval_bool(
            r#"(() => {
                const text = (document.body ? document.body.innerText : '').toLowerCase();
                return /click (on )?the (red|green|blue|yellow) (circle|square|triangle|shape)/
                    .test(text);
            })()"#,
        )
        .await
}

/// Click the shape named in the challenge text by CSS background color
///
/// Falls back to the visually dominant colored element when no exact
/// background match exists.
pub async fn click_visual_challenge_target(
    browser: &HiddenBrowser,
) -> Result<bool, BrowserError> {
    let clicked = browser
        .eval_bool(
            r#"(() => {
                const text = (document.body ? document.body.innerText : '').toLowerCase();
                const m = text.match(/click (?:on )?the (red|green|blue|yellow)/);
                if (!m) return false;
                const want = m[1];
                const rgb = {
                    red: [255, 0, 0], green: [0, 128, 0],
                    blue: [0, 0, 255], yellow: [255, 255, 0],
                }[want];

                let best = null, bestDist = Infinity;
                for (const el of document.querySelectorAll('div, span, canvas, svg, button, a')) {
                    if (el.offsetParent === null) continue;
                    const r = el.getBoundingClientRect();
                    if (r.width < 8 || r.height < 8 || r.width > 300) continue;
                    const bg = getComputedStyle(el).backgroundColor;
                    const c = bg.match(/rgba?\((\d+),\s*(\d+),\s*(\d+)/);
                    if (!c) continue;
                    const dist = Math.hypot(c[1] - rgb[0], c[2] - rgb[1], c[3] - rgb[2]);
                    if (dist < bestDist) { bestDist = dist; best = el; }
                }
                if (best && bestDist < 150) { best.click(); return true; }
                return false;
            })()"#,
        )
        .await?;
    debug!("visual challenge click: {}", clicked);
    Ok(clicked)
}

/// Harvest every link on the page with its anchor text
pub async fn harvest_links(browser: &HiddenBrowser) -> Result<Vec<PageLink>, BrowserError> {
    let value = browser
        .eval(
            r#"(() => {
                const out = [];
                for (const a of document.querySelectorAll('a[href]')) {
                    out.push({ href: a.href, text: (a.innerText || '').trim().slice(0, 120) });
                }
                return out;
            })()"#,
        )
        .await?;
    serde_json::from_value(value).map_err(|e| BrowserError::Script(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_descriptor_haystack() {
        let f = FieldDescriptor {
            name: "UserName".into(),
            id: "reg_user".into(),
            placeholder: "Choose a username".into(),
            input_type: "text".into(),
            tag: "input".into(),
        };
        assert!(f.haystack().contains("username"));
        assert_eq!(f.selector(), "#reg_user");
    }

    #[test]
    fn test_field_descriptor_selector_fallbacks() {
        let by_name = FieldDescriptor {
            name: "email".into(),
            id: String::new(),
            placeholder: String::new(),
            input_type: "email".into(),
            tag: "input".into(),
        };
        assert_eq!(by_name.selector(), "input[name=\"email\"]");

        let bare = FieldDescriptor {
            name: String::new(),
            id: String::new(),
            placeholder: String::new(),
            input_type: String::new(),
            tag: "textarea".into(),
        };
        assert_eq!(bare.selector(), "textarea");
    }
}
