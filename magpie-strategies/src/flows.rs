//! Multi-step interaction flows
//!
//! Each flow drives the browser through one path a payment page might hide
//! behind: coin selectors, buy buttons with modals, carts, registration and
//! login. Flows report the steps they took so successful ones can be replayed
//! on similar pages later.

use tracing::debug;

use magpie_browser::{
    click_visible_text, fill_input, form_fields, submit_form_of, BrowserError, HiddenBrowser,
};
use magpie_core::SyntheticIdentity;
use magpie_learn::{TxAction, TxStep};

use crate::forms::value_for_field;

/// Coin names worth clicking when a site offers a currency choice
pub const COIN_WORDS: &[&str] = &[
    "bitcoin", "btc", "monero", "xmr", "ethereum", "eth", "tron", "trx", "solana", "sol", "usdt",
];

const BUY_WORDS: &[&str] = &["buy now", "buy", "order now", "order", "purchase", "pay now"];

const CART_WORDS: &[&str] = &["add to cart", "add to basket", "to cart"];

const CHECKOUT_WORDS: &[&str] = &["checkout", "check out", "proceed", "continue"];

const REGISTER_WORDS: &[&str] = &["register", "sign up", "signup", "create account", "join"];

const LOGIN_WORDS: &[&str] = &["login", "log in", "sign in"];

/// Attribute stamped on the currency input a coin click selected
const COIN_MARKER: &str = "data-magpie-coin";

/// Selector for the marked coin input; `submit_coin_form` submits its form
pub const COIN_MARKER_SELECTOR: &str = "input[data-magpie-coin]";

/// What clicking a coin option actually hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinClick {
    /// Nothing on the page matched the coin name
    None,
    /// A radio or checkbox in a form; the form still needs submitting
    FormInput,
    /// A visible button or link, clicked directly
    Clickable,
}

fn coin_click_script(word: &str) -> Result<String, BrowserError> {
    let want = serde_json::to_string(word).map_err(|e| BrowserError::Script(e.to_string()))?;
    Ok(format!(
        r#"(() => {{
            for (const prev of document.querySelectorAll('[{marker}]')) {{
                prev.removeAttribute('{marker}');
            }}
            const want = {want};
            for (const el of document.querySelectorAll(
                    'input[type="radio"], input[type="checkbox"]')) {{
                const hay = ((el.value || '') + ' ' + (el.name || '') + ' '
                    + (el.id || '')).toLowerCase();
                if (hay.includes(want)) {{
                    el.click();
                    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                    el.setAttribute('{marker}', '1');
                    return true;
                }}
            }}
            return false;
        }})()"#,
        marker = COIN_MARKER,
        want = want,
    ))
}

/// Click one coin option by name
///
/// Radio and checkbox groups are tried first since currency pickers are
/// usually forms, then any visible clickable carrying the coin name. A form
/// input only reveals the address once its form is submitted, so the hit
/// kind tells the caller whether `submit_coin_form` must follow.
pub async fn click_coin_option(
    browser: &HiddenBrowser,
    word: &str,
) -> Result<CoinClick, BrowserError> {
    if browser.eval_bool(&coin_click_script(word)?).await? {
        browser.settle().await;
        return Ok(CoinClick::FormInput);
    }
    if click_visible_text(browser, &[word]).await?.is_some() {
        browser.settle().await;
        return Ok(CoinClick::Clickable);
    }
    Ok(CoinClick::None)
}

/// Fill identity fields around the selected coin option and submit its form
pub async fn submit_coin_form(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<bool, BrowserError> {
    for field in &form_fields(browser).await? {
        if let Some(value) = value_for_field(field, identity) {
            if !value.is_empty() {
                fill_input(browser, &field.selector(), &value).await?;
            }
        }
    }
    let submitted = submit_form_of(browser, COIN_MARKER_SELECTOR).await?;
    if submitted {
        browser.settle().await;
    }
    Ok(submitted)
}

/// Fill every recognizable field on the page and submit the enclosing form
///
/// Returns the steps taken, empty when there was nothing to fill.
pub async fn fill_and_submit(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<Vec<TxStep>, BrowserError> {
    let fields = form_fields(browser).await?;
    let mut steps = Vec::new();
    let mut last_selector = None;

    for field in &fields {
        let Some(value) = value_for_field(field, identity) else {
            continue;
        };
        if value.is_empty() {
            continue;
        }
        let selector = field.selector();
        if fill_input(browser, &selector, &value).await? {
            steps.push(
                TxStep::new(TxAction::FillForm).with_param("field", &field.haystack()),
            );
            last_selector = Some(selector);
        }
    }

    if let Some(selector) = last_selector {
        if submit_form_of(browser, &selector).await? {
            steps.push(TxStep::new(TxAction::SubmitForm));
            browser.settle().await;
        }
    }

    Ok(steps)
}

/// Click a buy button and work through whatever modal or form appears
pub async fn buy_flow(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<Vec<TxStep>, BrowserError> {
    let Some(word) = click_visible_text(browser, BUY_WORDS).await? else {
        return Ok(Vec::new());
    };
    browser.settle().await;

    let mut steps = vec![
        TxStep::new(TxAction::ClickButton).with_param("text", &word),
        TxStep::new(TxAction::WaitForModal),
    ];
    steps.extend(fill_and_submit(browser, identity).await?);

    debug!("buy flow: {} steps", steps.len());
    Ok(steps)
}

/// Pick the highest-priced visible option, then continue
///
/// Price-option pages list amounts next to radio inputs or buttons; the
/// biggest amount is likeliest to lead straight to a payment address.
pub async fn select_price_option(browser: &HiddenBrowser) -> Result<Vec<TxStep>, BrowserError> {
    let picked = browser
        .eval_bool(
            r#"(() => {
                let best = null, bestAmount = -1;
                for (const el of document.querySelectorAll(
                        'input[type="radio"], button, a, [role="button"], label')) {
                    if (el.offsetParent === null) continue;
                    const text = (el.innerText || '') + ' '
                        + ((el.labels && el.labels[0]) ? el.labels[0].innerText : '');
                    const m = text.match(/[$€£]?\s*(\d+(?:[.,]\d+)?)/);
                    if (!m) continue;
                    const amount = parseFloat(m[1].replace(',', '.'));
                    if (amount > bestAmount) { bestAmount = amount; best = el; }
                }
                if (!best) return false;
                best.click();
                return true;
            })()"#,
        )
        .await?;

    if !picked {
        return Ok(Vec::new());
    }
    browser.settle().await;

    let mut steps = vec![TxStep::new(TxAction::SelectPriceOption).with_param("pick", "highest")];
    if click_visible_text(browser, CHECKOUT_WORDS).await?.is_some() {
        steps.push(TxStep::new(TxAction::ClickContinue));
        browser.settle().await;
    }
    Ok(steps)
}

/// Add the priciest item to the cart and head for checkout
pub async fn cart_flow(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<Vec<TxStep>, BrowserError> {
    if click_visible_text(browser, CART_WORDS).await?.is_none() {
        return Ok(Vec::new());
    }
    browser.settle().await;
    let mut steps = vec![TxStep::new(TxAction::FindProduct)];

    if click_visible_text(browser, CHECKOUT_WORDS).await?.is_some() {
        steps.push(TxStep::new(TxAction::ClickContinue));
        browser.settle().await;
        steps.extend(fill_and_submit(browser, identity).await?);
    }
    Ok(steps)
}

/// Navigate to the registration form and create an account
pub async fn register_flow(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<bool, BrowserError> {
    if click_visible_text(browser, REGISTER_WORDS).await?.is_some() {
        browser.settle().await;
    }
    let steps = fill_and_submit(browser, identity).await?;
    Ok(steps.iter().any(|s| s.action == TxAction::SubmitForm))
}

/// Log in with a previously registered identity
pub async fn login_flow(
    browser: &HiddenBrowser,
    identity: &SyntheticIdentity,
) -> Result<bool, BrowserError> {
    if click_visible_text(browser, LOGIN_WORDS).await?.is_some() {
        browser.settle().await;
    }
    let steps = fill_and_submit(browser, identity).await?;
    Ok(steps.iter().any(|s| s.action == TxAction::SubmitForm))
}

/// Replay a learned sequence step by step
///
/// Stops at the first step that no longer applies; the caller decides whether
/// the partial replay still counts by extracting afterwards.
pub async fn replay_sequence(
    browser: &HiddenBrowser,
    steps: &[TxStep],
    identity: &SyntheticIdentity,
) -> Result<bool, BrowserError> {
    for step in steps {
        let applied = match step.action {
            TxAction::FindProduct => click_visible_text(browser, CART_WORDS).await?.is_some(),
            TxAction::ClickButton => match step.params.get("text") {
                Some(text) => click_visible_text(browser, &[text.as_str()]).await?.is_some(),
                None => click_visible_text(browser, BUY_WORDS).await?.is_some(),
            },
            TxAction::WaitForModal => {
                browser.settle().await;
                true
            }
            TxAction::FillForm | TxAction::SubmitForm => {
                !fill_and_submit(browser, identity).await?.is_empty()
            }
            TxAction::SelectPriceOption => !select_price_option(browser).await?.is_empty(),
            TxAction::ClickContinue => {
                click_visible_text(browser, CHECKOUT_WORDS).await?.is_some()
            }
        };
        if !applied {
            return Ok(false);
        }
        browser.settle().await;
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_click_marks_input_for_submission() {
        let js = coin_click_script("btc").unwrap();
        assert!(js.contains("\"btc\""));
        assert!(js.contains("el.click()"));
        assert!(js.contains("setAttribute('data-magpie-coin'"));
        // submit_coin_form must target the same marker the click stamps
        assert!(COIN_MARKER_SELECTOR.contains(COIN_MARKER));
    }

    #[test]
    fn test_coin_click_script_escapes_word() {
        let js = coin_click_script("mo'nero").unwrap();
        assert!(js.contains(r#""mo'nero""#));
    }
}
