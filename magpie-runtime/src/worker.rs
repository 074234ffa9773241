//! Per-URL worker
//!
//! One call processes one URL end to end: rotate the circuit when due,
//! launch a fresh browser, drive the pipeline, feed both learners, stream
//! findings to the sink, and tear the browser down on every exit path.

use std::sync::Arc;
use tracing::{debug, warn};

use magpie_browser::{BrowserError, CaptchaSolver, HiddenBrowser};
use magpie_core::{AttemptRecord, ContentSignature, ErrorKind, Stage, Strategy};
use magpie_learn::{FlowLearner, PatternLearner};
use magpie_strategies::{run_pipeline, Oracle, PipelineContext, PipelineReport};
use magpie_tor::{CircuitManager, TorConfig};

use crate::sink::ResultSink;

/// Everything a worker needs, shared across the pool
pub struct WorkerContext {
    pub tor: TorConfig,
    pub circuits: Arc<CircuitManager>,
    pub learner: Arc<PatternLearner>,
    pub flows: Arc<FlowLearner>,
    pub sink: Arc<ResultSink>,
    pub solver: Arc<dyn CaptchaSolver>,
    pub oracle: Option<Arc<Oracle>>,
    pub screenshots_dir: std::path::PathBuf,
    pub unsolved_captcha_dir: std::path::PathBuf,
}

/// Counters one URL contributes to the run summary
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlOutcome {
    pub findings: usize,
    pub duplicates: usize,
    pub skipped: bool,
}

fn error_kind_of(e: &BrowserError) -> ErrorKind {
    if e.is_connection_error() {
        ErrorKind::ConnectionTimeout
    } else {
        ErrorKind::SiteUnavailable
    }
}

/// Failure record for attempts that died before any strategy could run
///
/// No strategy was exercised, so the loss is attributed to the baseline
/// rather than a fresh pick that never touched the page.
fn launch_failure_record(url: &str, e: &BrowserError, worker_id: &str) -> AttemptRecord {
    AttemptRecord::failure(url, Strategy::Basic, Stage::Loaded, error_kind_of(e), worker_id)
}

/// Process one URL; never panics, never leaves a browser running
pub async fn process_url(worker_id: &str, url: &str, ctx: &WorkerContext) -> UrlOutcome {
    ctx.circuits.maybe_rotate_after(url).await;

    let policy = ctx.learner.error_policy(ErrorKind::ConnectionTimeout);
    let attempts = 1 + policy.retries as usize;

    let mut last_error = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            debug!("retry {} for {}", attempt, url);
        }
        match try_once(worker_id, url, ctx).await {
            Ok(outcome) => return outcome,
            Err(e) => {
                if e.is_connection_error() {
                    ctx.circuits.on_connection_error().await;
                }
                last_error = Some(e);
            }
        }
    }

    // All attempts failed at the browser level
    let Some(e) = last_error else {
        return UrlOutcome { skipped: true, ..Default::default() };
    };
    warn!("{} giving up on {}: {}", worker_id, url, e);
    ctx.learner.record(&launch_failure_record(url, &e, worker_id), None);

    if let Err(sink_err) = ctx.sink.skip(url, &e.to_string()) {
        warn!("skip row lost for {}: {}", url, sink_err);
    }
    UrlOutcome { skipped: true, ..Default::default() }
}

async fn try_once(
    worker_id: &str,
    url: &str,
    ctx: &WorkerContext,
) -> Result<UrlOutcome, BrowserError> {
    let browser = HiddenBrowser::launch(&ctx.tor).await?;

    let result = drive(worker_id, url, &browser, ctx).await;
    browser.close().await;
    result
}

async fn drive(
    worker_id: &str,
    url: &str,
    browser: &HiddenBrowser,
    ctx: &WorkerContext,
) -> Result<UrlOutcome, BrowserError> {
    browser.goto(url).await?;

    let signature_key = ContentSignature::from_html(&browser.html().await?).key();
    let strategy = ctx.learner.choose(url, Some(&signature_key));
    debug!("{} trying {} with {}", worker_id, url, strategy);

    let pipeline_ctx = PipelineContext {
        solver: ctx.solver.as_ref(),
        oracle: ctx.oracle.as_deref(),
        flows: ctx.flows.as_ref(),
        screenshots_dir: &ctx.screenshots_dir,
        unsolved_captcha_dir: &ctx.unsolved_captcha_dir,
    };

    let report = run_pipeline(browser, url, strategy, &pipeline_ctx).await?;
    let outcome = settle_report(worker_id, url, strategy, &report, ctx);
    Ok(outcome)
}

fn settle_report(
    worker_id: &str,
    url: &str,
    strategy: Strategy,
    report: &PipelineReport,
    ctx: &WorkerContext,
) -> UrlOutcome {
    let record = if report.is_success() {
        AttemptRecord::success(url, strategy, report.stage, worker_id)
    } else {
        AttemptRecord::failure(
            url,
            strategy,
            report.stage,
            report.error_kind.unwrap_or(ErrorKind::UnknownError),
            worker_id,
        )
    };
    ctx.learner.record(&record, Some(&report.signature_key));

    let mut outcome = UrlOutcome::default();
    for finding in &report.findings {
        match ctx.sink.emit(finding) {
            Ok(true) => outcome.findings += 1,
            Ok(false) => outcome.duplicates += 1,
            Err(e) => warn!("finding row lost for {}: {}", finding.address, e),
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::Outcome;

    #[test]
    fn test_launch_failure_attributed_to_baseline() {
        let timeout = BrowserError::Timeout(45);
        let record = launch_failure_record("http://x.onion/", &timeout, "worker-1");
        assert_eq!(record.strategy, Strategy::Basic);
        assert_eq!(record.outcome, Outcome::Failure);
        assert_eq!(record.error_kind, Some(ErrorKind::ConnectionTimeout));

        let launch = BrowserError::Launch("no chrome".into());
        let record = launch_failure_record("http://x.onion/", &launch, "worker-1");
        assert_eq!(record.strategy, Strategy::Basic);
        assert_eq!(record.error_kind, Some(ErrorKind::SiteUnavailable));
    }
}
