//! The per-URL interaction pipeline
//!
//! One run drives a loaded page through escalating stages until an address
//! falls out or the options are exhausted: direct extraction, CAPTCHA
//! handling, learned-flow replay, coin selection, purchase and cart flows,
//! registration and login, then one hop into the most promising internal
//! links. The chosen strategy bounds how deep the run goes.
//!
//! Extraction short-circuits everything: the moment any step yields
//! addresses, the remaining steps are skipped.

use std::path::Path;
use tracing::{debug, info, warn};

use magpie_browser::{
    capture_annotated, click_visual_challenge_target, find_captcha_image, find_captcha_input,
    fill_input, harvest_links, has_visual_challenge, save_unsolved, scroll_full_height,
    submit_form_of, BrowserError, CaptchaSolver, HiddenBrowser,
};
use magpie_core::{
    classify, extract_addresses, generate_identity, ContentSignature, ErrorKind, Finding,
    SiteKind, Stage, Strategy, SyntacticValidator, SyntheticIdentity,
};
use magpie_learn::FlowLearner;

use crate::flows::{
    buy_flow, cart_flow, click_coin_option, login_flow, register_flow, replay_sequence,
    select_price_option, submit_coin_form, CoinClick, COIN_WORDS,
};
use crate::links::prioritize_links;
use crate::oracle::Oracle;

/// Shared collaborators for every pipeline run
pub struct PipelineContext<'a> {
    pub solver: &'a dyn CaptchaSolver,
    pub oracle: Option<&'a Oracle>,
    pub flows: &'a FlowLearner,
    pub screenshots_dir: &'a Path,
    pub unsolved_captcha_dir: &'a Path,
}

/// What one run produced
#[derive(Debug)]
pub struct PipelineReport {
    pub findings: Vec<Finding>,
    /// Deepest stage reached, regardless of outcome
    pub stage: Stage,
    /// Set when the run produced nothing
    pub error_kind: Option<ErrorKind>,
    /// Structural key of the landing page, for the learners
    pub signature_key: String,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        !self.findings.is_empty()
    }
}

/// Extract from the current DOM; annotate and record every new address
async fn extract_here(
    browser: &HiddenBrowser,
    ctx: &PipelineContext<'_>,
    findings: &mut Vec<Finding>,
) -> Result<bool, BrowserError> {
    let html = browser.html().await?;
    let title = browser.title().await.unwrap_or_default();
    let page_url = browser.current_url().await?;

    let hits = extract_addresses(&html, &SyntacticValidator);
    let mut found_new = false;

    for (chain, address) in hits {
        if findings.iter().any(|f| f.address == address) {
            continue;
        }

        let mut finding = Finding::new(&page_url, &title, chain, &address)
            .with_categories(classify(&page_url, &title, &html));

        // Capture failure downgrades to the sentinel path, never loses the hit
        match capture_annotated(browser, chain, &address, &title, ctx.screenshots_dir).await {
            Ok(path) => finding = finding.with_screenshot(&path.to_string_lossy()),
            Err(e) => warn!("screenshot failed for {}: {}", address, e),
        }

        info!("{} address on {}: {}", chain, page_url, address);
        findings.push(finding);
        found_new = true;
    }

    Ok(found_new)
}

/// Solve a text CAPTCHA in place; true when an answer was submitted
async fn solve_text_captcha(
    browser: &HiddenBrowser,
    url: &str,
    ctx: &PipelineContext<'_>,
) -> Result<bool, BrowserError> {
    let Some(image_selector) = find_captcha_image(browser).await? else {
        return Ok(false);
    };
    let image = browser.element_screenshot(&image_selector).await?;

    let Some(answer) = ctx.solver.solve(&image).await else {
        debug!("captcha unsolved by {}", ctx.solver.name());
        save_unsolved(ctx.unsolved_captcha_dir, url, &image).await;
        return Ok(false);
    };

    let Some(input_selector) = find_captcha_input(browser).await? else {
        return Ok(false);
    };
    if !fill_input(browser, &input_selector, &answer).await? {
        return Ok(false);
    }
    submit_form_of(browser, &input_selector).await?;
    browser.settle().await;
    debug!("captcha answer submitted");
    Ok(true)
}

fn identity_kind(signature: &ContentSignature) -> SiteKind {
    if signature.has_marketplace_indicator {
        SiteKind::Marketplace
    } else if signature.has_login_form {
        SiteKind::Forum
    } else {
        SiteKind::General
    }
}

async fn make_identity(
    ctx: &PipelineContext<'_>,
    kind: SiteKind,
    title: &str,
) -> SyntheticIdentity {
    match ctx.oracle {
        Some(oracle) => oracle.identity_for(kind, title).await,
        None => generate_identity(kind),
    }
}

/// Which steps one run may take
///
/// The chosen strategy bounds the depth, and the page shape opens the
/// interaction steps on its own: a visible currency form or marketplace
/// chrome is driven even when the strategy alone would stop short.
#[derive(Debug, Clone, Copy)]
struct StepGates {
    solve_visual: bool,
    solve_text: bool,
    interactive: bool,
    purchasing: bool,
    registering: bool,
    logging_in: bool,
}

fn gates_for(strategy: Strategy, signature: &ContentSignature) -> StepGates {
    let page_wants_interaction = signature.has_crypto_form || signature.has_marketplace_indicator;
    StepGates {
        solve_visual: strategy >= Strategy::VisualCaptcha,
        solve_text: matches!(
            strategy,
            Strategy::AiEnhanced | Strategy::CaptchaSolver | Strategy::Marketplace
        ) || strategy >= Strategy::Custom,
        interactive: strategy >= Strategy::AiEnhanced || page_wants_interaction,
        purchasing: matches!(
            strategy,
            Strategy::Custom | Strategy::Payment | Strategy::Marketplace
        ) || page_wants_interaction,
        registering: matches!(strategy, Strategy::Register | Strategy::Marketplace),
        logging_in: matches!(
            strategy,
            Strategy::Login | Strategy::Register | Strategy::Marketplace
        ),
    }
}

/// Fold sub-run findings in, keeping the first sighting of each address
fn merge_findings(into: &mut Vec<Finding>, from: Vec<Finding>) {
    for finding in from {
        if !into.iter().any(|f| f.address == finding.address) {
            into.push(finding);
        }
    }
}

/// Failure taxonomy from what the page showed
fn classify_failure(signature: &ContentSignature) -> ErrorKind {
    if signature.has_captcha {
        ErrorKind::CaptchaRequired
    } else if signature.has_login_form {
        ErrorKind::LoginRequired
    } else if signature.has_crypto_form || signature.has_marketplace_indicator {
        ErrorKind::PaymentRequired
    } else if signature.script_count_bucket >= 3 && signature.length_bucket <= 1 {
        // Lots of script, almost no markup: the content never rendered
        ErrorKind::JavascriptRequired
    } else {
        ErrorKind::UnknownError
    }
}

/// Run the full decision tree against an already-loaded page
pub async fn run_pipeline(
    browser: &HiddenBrowser,
    url: &str,
    strategy: Strategy,
    ctx: &PipelineContext<'_>,
) -> Result<PipelineReport, BrowserError> {
    run_steps(browser, url, strategy, ctx, true).await
}

/// One pipeline pass; `follow_links` is off for pages reached by a link hop
async fn run_steps(
    browser: &HiddenBrowser,
    url: &str,
    strategy: Strategy,
    ctx: &PipelineContext<'_>,
    follow_links: bool,
) -> Result<PipelineReport, BrowserError> {
    let landing_html = browser.html().await?;
    let signature = ContentSignature::from_html(&landing_html);
    let signature_key = signature.key();
    let title = browser.title().await.unwrap_or_default();

    let mut findings = Vec::new();
    let mut stage = Stage::Loaded;

    let finish = |findings: Vec<Finding>, stage: Stage| PipelineReport {
        error_kind: if findings.is_empty() {
            Some(classify_failure(&signature))
        } else {
            None
        },
        findings,
        stage,
        signature_key: signature_key.clone(),
    };

    // Step 1: what is already on the page
    if extract_here(browser, ctx, &mut findings).await? {
        return Ok(finish(findings, Stage::ExtractedAddress));
    }

    let gates = gates_for(strategy, &signature);

    // Step 2: visual challenge gate, one retry
    if gates.solve_visual && has_visual_challenge(browser).await? {
        for _ in 0..2 {
            if !click_visual_challenge_target(browser).await? {
                break;
            }
            browser.settle().await;
            stage = Stage::SolvedCaptcha;
            if extract_here(browser, ctx, &mut findings).await? {
                return Ok(finish(findings, stage));
            }
            if !has_visual_challenge(browser).await? {
                break;
            }
        }
    }

    // Step 3: text CAPTCHA gate
    if gates.solve_text && signature.has_captcha {
        if solve_text_captcha(browser, url, ctx).await? {
            stage = stage.max(Stage::SolvedCaptcha);
            if extract_here(browser, ctx, &mut findings).await? {
                return Ok(finish(findings, stage));
            }
        }
    }

    let identity = if gates.interactive || gates.purchasing || gates.registering || gates.logging_in
    {
        make_identity(ctx, identity_kind(&signature), &title).await
    } else {
        generate_identity(identity_kind(&signature))
    };

    if gates.interactive {
        // Step 4: replay flows that worked on pages shaped like this one
        for sequence in ctx.flows.recommend(&signature_key) {
            let completed = replay_sequence(browser, &sequence.steps, &identity).await?;
            let found = extract_here(browser, ctx, &mut findings).await?;
            ctx.flows
                .record_outcome(&signature_key, &sequence.steps, completed && found);
            if found {
                return Ok(finish(findings, Stage::ExtractedAddress));
            }
        }

        // Step 5: lazy content, a proactive click, then every coin option
        scroll_full_height(browser).await?;
        if extract_here(browser, ctx, &mut findings).await? {
            return Ok(finish(findings, Stage::ExtractedAddress));
        }
        if magpie_browser::click_visible_text(
            browser,
            &["buy", "purchase", "order", "trial", "continue", "sign up"],
        )
        .await?
        .is_some()
        {
            browser.settle().await;
            if extract_here(browser, ctx, &mut findings).await? {
                return Ok(finish(findings, Stage::ExtractedAddress));
            }
        }
        // Every coin option is enumerated, one address per chain. Picking a
        // form input only changes the page after its form goes in, so each
        // pick is submitted with identity data, extracted, and the option
        // page reloaded before the next currency.
        let mut coin_hit = false;
        for word in COIN_WORDS {
            let click = click_coin_option(browser, word).await?;
            if click == CoinClick::None {
                continue;
            }
            if click == CoinClick::FormInput {
                submit_coin_form(browser, &identity).await?;
            }
            if extract_here(browser, ctx, &mut findings).await? {
                coin_hit = true;
            }
            if browser.current_url().await? != url {
                browser.goto(url).await?;
                browser.settle().await;
            }
        }
        if coin_hit {
            return Ok(finish(findings, Stage::ExtractedAddress));
        }
    }

    if gates.purchasing {
        // Step 6: buy buttons, price options, carts
        let steps = buy_flow(browser, &identity).await?;
        if !steps.is_empty() {
            let found = extract_here(browser, ctx, &mut findings).await?;
            ctx.flows.record_outcome(&signature_key, &steps, found);
            if found {
                return Ok(finish(findings, Stage::ExtractedAddress));
            }
        }

        let steps = select_price_option(browser).await?;
        if !steps.is_empty() {
            let found = extract_here(browser, ctx, &mut findings).await?;
            ctx.flows.record_outcome(&signature_key, &steps, found);
            if found {
                return Ok(finish(findings, Stage::ExtractedAddress));
            }
        }

        let steps = cart_flow(browser, &identity).await?;
        if !steps.is_empty() {
            stage = stage.max(Stage::AddedToCart);
            let found = extract_here(browser, ctx, &mut findings).await?;
            ctx.flows.record_outcome(&signature_key, &steps, found);
            if found {
                return Ok(finish(findings, stage));
            }
        }
    }

    // Step 7: account creation and login
    if gates.registering && register_flow(browser, &identity).await? {
        stage = stage.max(Stage::Registered);
        if extract_here(browser, ctx, &mut findings).await? {
            return Ok(finish(findings, stage));
        }
    }
    if gates.logging_in && login_flow(browser, &identity).await? {
        stage = stage.max(Stage::LoggedIn);
        if extract_here(browser, ctx, &mut findings).await? {
            return Ok(finish(findings, stage));
        }
    }

    // Step 8: one hop into the most promising internal links, each driven
    // through the full pipeline with further hops disabled
    if follow_links {
        let links = harvest_links(browser).await.unwrap_or_default();
        for link in prioritize_links(url, &links) {
            if let Err(e) = browser.goto(&link).await {
                if e.is_connection_error() {
                    return Err(e);
                }
                debug!("link hop failed: {}", e);
                continue;
            }
            let sub = Box::pin(run_steps(browser, &link, strategy, ctx, false)).await?;
            stage = stage.max(sub.stage);
            merge_findings(&mut findings, sub.findings);
            if !findings.is_empty() {
                return Ok(finish(findings, stage));
            }
        }
    }

    Ok(finish(findings, stage))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signature_from(html: &str) -> ContentSignature {
        ContentSignature::from_html(html)
    }

    #[test]
    fn test_failure_classification() {
        let captcha = signature_from("<html><body>Enter the CAPTCHA</body></html>");
        assert_eq!(classify_failure(&captcha), ErrorKind::CaptchaRequired);

        let login = signature_from(
            r#"<html><body><form><input type="password" name="p"></form></body></html>"#,
        );
        assert_eq!(classify_failure(&login), ErrorKind::LoginRequired);

        let market = signature_from("<html><body><button>Add to cart</button></body></html>");
        assert_eq!(classify_failure(&market), ErrorKind::PaymentRequired);

        let blank = signature_from("<html><body><p>hello</p></body></html>");
        assert_eq!(classify_failure(&blank), ErrorKind::UnknownError);
    }

    #[test]
    fn test_js_shell_classified() {
        let mut shell = String::from("<html><head>");
        for _ in 0..8 {
            shell.push_str("<script src=\"/app.js\"></script>");
        }
        shell.push_str("</head><body></body></html>");
        assert_eq!(
            classify_failure(&signature_from(&shell)),
            ErrorKind::JavascriptRequired
        );
    }

    #[test]
    fn test_hidden_service_default_strategy_is_interactive() {
        // AiEnhanced is what an unseen .onion gets on first contact; it must
        // open the interaction steps, not just extraction and captchas.
        let plain = signature_from("<html><body>hi</body></html>");
        assert!(gates_for(Strategy::AiEnhanced, &plain).interactive);
        assert!(!gates_for(Strategy::Basic, &plain).interactive);
        assert!(gates_for(Strategy::JsInteractive, &plain).interactive);
    }

    #[test]
    fn test_page_shape_opens_interaction_steps() {
        let crypto = signature_from(
            r#"<html><body><form>
                <input type="radio" name="payCrypto" value="btc">
                <input type="radio" name="payCrypto" value="eth">
            </form></body></html>"#,
        );
        let gates = gates_for(Strategy::Basic, &crypto);
        assert!(gates.interactive);
        assert!(gates.purchasing);

        let market = signature_from("<html><body><button>Add to cart</button></body></html>");
        assert!(gates_for(Strategy::Basic, &market).interactive);
    }

    #[test]
    fn test_registration_stays_strategy_gated() {
        let market = signature_from("<html><body>escrow vendor</body></html>");
        assert!(!gates_for(Strategy::Basic, &market).registering);
        assert!(gates_for(Strategy::Register, &market).registering);
    }

    #[test]
    fn test_merge_findings_keeps_first_sighting() {
        use magpie_core::Chain;
        let mut parent = vec![Finding::new(
            "http://a.onion/",
            "A",
            Chain::Btc,
            "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
        )];
        let sub = vec![
            Finding::new(
                "http://a.onion/buy",
                "Buy",
                Chain::Btc,
                "1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2",
            ),
            Finding::new(
                "http://a.onion/buy",
                "Buy",
                Chain::Eth,
                "0x52908400098527886E0F7030069857D2E4169EE7",
            ),
        ];
        merge_findings(&mut parent, sub);
        assert_eq!(parent.len(), 2);
        assert_eq!(parent[0].url, "http://a.onion/");
        assert_eq!(parent[1].chain, Chain::Eth);
    }

    #[test]
    fn test_identity_kind_mapping() {
        let market = signature_from("<html><body>escrow vendor</body></html>");
        assert_eq!(identity_kind(&market), SiteKind::Marketplace);

        let forum = signature_from(
            r#"<html><body><form><input type="password"></form></body></html>"#,
        );
        assert_eq!(identity_kind(&forum), SiteKind::Forum);

        let plain = signature_from("<html><body>hi</body></html>");
        assert_eq!(identity_kind(&plain), SiteKind::General);
    }
}
