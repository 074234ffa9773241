//! Screenshot annotation
//!
//! Locates the DOM node carrying the extracted address, centers it, draws the
//! marker in the DOM (red outline plus caption overlay), and captures the
//! frame. When the node cannot be found, a full-page shot with a banner
//! listing the address is taken instead. Capture failure is non-fatal to the
//! caller; the finding keeps its sentinel path.

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use magpie_core::Chain;

use crate::driver::{BrowserError, HiddenBrowser};

/// Caption shown next to the marker: `{chain}: {first-8}…{last-8}`
pub fn caption_for(chain: Chain, address: &str) -> String {
    if address.len() <= 16 {
        return format!("{}: {}", chain, address);
    }
    let first: String = address.chars().take(8).collect();
    let last: String = address
        .chars()
        .rev()
        .take(8)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("{}: {}…{}", chain, first, last)
}

/// Filesystem-safe fragment from a page title
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    let fragment = if trimmed.is_empty() { "untitled" } else { trimmed };
    fragment.chars().take(60).collect()
}

/// Annotate the address in-page and capture a screenshot
///
/// Returns the written file path.
pub async fn capture_annotated(
    browser: &HiddenBrowser,
    chain: Chain,
    address: &str,
    title: &str,
    out_dir: &Path,
) -> Result<PathBuf, BrowserError> {
    let caption = caption_for(chain, address);
    let located = locate_and_mark(browser, address, &caption).await?;

    let full_page = if located {
        debug!("address node located, marker drawn");
        false
    } else {
        debug!("address node not found, using banner fallback");
        banner_fallback(browser, &caption).await?;
        true
    };

    // Give the overlay a frame to paint
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let png = browser.screenshot(full_page).await?;

    let filename = format!(
        "{}_{}.png",
        sanitize_title(title),
        Utc::now().format("%Y%m%d_%H%M%S%3f")
    );
    let path = out_dir.join(filename);

    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| BrowserError::Script(format!("screenshot dir: {}", e)))?;
    tokio::fs::write(&path, &png)
        .await
        .map_err(|e| BrowserError::Script(format!("screenshot write: {}", e)))?;

    Ok(path)
}

/// Find the node containing the address, center it, and draw the marker
async fn locate_and_mark(
    browser: &HiddenBrowser,
    address: &str,
    caption: &str,
) -> Result<bool, BrowserError> {
    let js = format!(
        r#"(() => {{
            const addr = {addr};
            const caption = {caption};

            const findNode = () => {{
                // Inputs carrying the address as a value
                for (const el of document.querySelectorAll('input, textarea')) {{
                    if ((el.value || '').includes(addr)) return el;
                }}
                // code/pre blocks first: most payment pages use them
                for (const el of document.querySelectorAll('code, pre')) {{
                    if ((el.innerText || '').includes(addr)) return el;
                }}
                // Deepest element whose text contains the address
                const walker = document.createTreeWalker(
                    document.body, NodeFilter.SHOW_TEXT);
                while (walker.nextNode()) {{
                    const node = walker.currentNode;
                    if (node.textContent.includes(addr)) {{
                        return node.parentElement;
                    }}
                }}
                return null;
            }};

            const el = findNode();
            if (!el) return false;

            el.scrollIntoView({{ block: 'center', inline: 'nearest' }});
            el.style.outline = '4px solid #ff0000';
            el.style.outlineOffset = '2px';

            const tag = document.createElement('div');
            tag.textContent = caption;
            tag.style.cssText =
                'position:absolute;z-index:2147483647;background:#ff0000;' +
                'color:#fff;font:bold 13px monospace;padding:2px 6px;';
            const rect = el.getBoundingClientRect();
            tag.style.left = (rect.left + window.scrollX) + 'px';
            tag.style.top = (rect.top + window.scrollY - 22) + 'px';
            document.body.appendChild(tag);
            return true;
        }})()"#,
        addr = serde_json::to_string(address).map_err(|e| BrowserError::Script(e.to_string()))?,
        caption = serde_json::to_string(caption).map_err(|e| BrowserError::Script(e.to_string()))?,
    );
    browser.eval_bool(&js).await
}

/// Fixed banner listing the address when no node could be located
async fn banner_fallback(browser: &HiddenBrowser, caption: &str) -> Result<(), BrowserError> {
    let js = format!(
        r#"(() => {{
            const banner = document.createElement('div');
            banner.textContent = {caption};
            banner.style.cssText =
                'position:fixed;top:0;left:0;right:0;z-index:2147483647;' +
                'background:#ff0000;color:#fff;font:bold 16px monospace;' +
                'padding:8px;text-align:center;';
            document.body.appendChild(banner);
            return true;
        }})()"#,
        caption = serde_json::to_string(caption).map_err(|e| BrowserError::Script(e.to_string()))?,
    );
    if !browser.eval_bool(&js).await? {
        warn!("banner injection failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caption_truncates_long_address() {
        let caption = caption_for(Chain::Btc, "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
        assert!(caption.starts_with("BTC: 1A1zP1eP"));
        assert!(caption.ends_with("v7DivfNa"));
        assert!(caption.contains('…'));
    }

    #[test]
    fn test_caption_short_address_untouched() {
        let caption = caption_for(Chain::Eth, "0xshort");
        assert_eq!(caption, "ETH: 0xshort");
    }

    #[test]
    fn test_sanitize_title() {
        assert_eq!(sanitize_title("Dark Market / Checkout!"), "Dark_Market___Checkout");
        assert_eq!(sanitize_title("///"), "untitled");
        assert_eq!(sanitize_title(""), "untitled");
        assert!(sanitize_title(&"x".repeat(200)).len() <= 60);
    }
}
