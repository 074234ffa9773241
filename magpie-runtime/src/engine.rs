//! The engine: bounded worker pool over the URL list
//!
//! N workers process URLs concurrently; a watch channel broadcasts shutdown
//! on Ctrl-C so in-flight URLs finish while queued ones drain. Learner state
//! checkpoints every [`CHECKPOINT_INTERVAL`] URLs and once more at the end,
//! so an interrupted run keeps almost everything it learned.

use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use magpie_browser::{CaptchaSolver, NullSolver};
use magpie_learn::{FlowLearner, PatternLearner};
use magpie_strategies::{Oracle, OracleConfig};
use magpie_tor::{CircuitManager, TorConfig};

use crate::sink::{ResultSink, SinkError};
use crate::worker::{process_url, UrlOutcome, WorkerContext};

/// URLs between learner checkpoints
pub const CHECKPOINT_INTERVAL: u64 = 25;

/// Engine configuration
pub struct EngineConfig {
    pub tor: TorConfig,
    pub workers: usize,
    pub output_dir: PathBuf,
    pub pattern_state_path: PathBuf,
    pub flow_state_path: PathBuf,
    /// LLM backend; `None` disables CAPTCHA solving and AI identities
    pub oracle: Option<OracleConfig>,
}

/// End-of-run accounting
#[derive(Debug, Default, Clone, Copy)]
pub struct Summary {
    pub processed: u64,
    pub findings: u64,
    pub duplicates: u64,
    pub skipped: u64,
    pub interrupted: bool,
}

/// Owns the shared state and drives the pool
pub struct Engine {
    ctx: Arc<WorkerContext>,
    workers: usize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, SinkError> {
        let sink = Arc::new(ResultSink::open(&config.output_dir)?);

        let oracle = config.oracle.map(|c| Arc::new(Oracle::new(c)));
        let solver: Arc<dyn CaptchaSolver> = match &oracle {
            Some(oracle) => oracle.clone(),
            None => Arc::new(NullSolver),
        };

        let ctx = WorkerContext {
            circuits: Arc::new(CircuitManager::new(config.tor.clone())),
            tor: config.tor,
            learner: Arc::new(PatternLearner::load(&config.pattern_state_path)),
            flows: Arc::new(FlowLearner::load(&config.flow_state_path)),
            sink,
            solver,
            oracle,
            screenshots_dir: config.output_dir.join("screenshots"),
            unsolved_captcha_dir: config.output_dir.join("unsolved_captchas"),
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            workers: config.workers.max(1),
        })
    }

    fn checkpoint(&self) {
        if let Err(e) = self.ctx.learner.checkpoint() {
            warn!("pattern checkpoint failed: {}", e);
        }
        if let Err(e) = self.ctx.flows.checkpoint() {
            warn!("flow checkpoint failed: {}", e);
        }
    }

    /// Process every URL; returns when the list drains or shutdown lands
    pub async fn run(&self, urls: Vec<String>) -> Summary {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested, draining queue");
                let _ = shutdown_tx.send(true);
            }
        });

        let total = urls.len();
        info!("processing {} urls with {} workers", total, self.workers);

        let processed = AtomicU64::new(0);
        let findings = AtomicU64::new(0);
        let duplicates = AtomicU64::new(0);
        let skipped = AtomicU64::new(0);
        let dropped = AtomicU64::new(0);

        stream::iter(urls.into_iter().enumerate())
            .for_each_concurrent(self.workers, |(i, url)| {
                let ctx = self.ctx.clone();
                let shutdown = shutdown_rx.clone();
                let processed = &processed;
                let findings = &findings;
                let duplicates = &duplicates;
                let skipped = &skipped;
                let dropped = &dropped;
                async move {
                    if *shutdown.borrow() {
                        dropped.fetch_add(1, Ordering::Relaxed);
                        skipped.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = ctx.sink.skip(&url, "interrupted") {
                            warn!("skip row lost for {}: {}", url, e);
                        }
                        return;
                    }

                    let worker_id = format!("worker-{}", i % self.workers + 1);
                    let UrlOutcome {
                        findings: found,
                        duplicates: dups,
                        skipped: was_skipped,
                    } = process_url(&worker_id, &url, &ctx).await;

                    findings.fetch_add(found as u64, Ordering::Relaxed);
                    duplicates.fetch_add(dups as u64, Ordering::Relaxed);
                    if was_skipped {
                        skipped.fetch_add(1, Ordering::Relaxed);
                    }

                    let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                    if done % CHECKPOINT_INTERVAL == 0 {
                        info!("{}/{} urls processed", done, total);
                        self.checkpoint();
                    }
                }
            })
            .await;

        self.checkpoint();

        Summary {
            processed: processed.load(Ordering::Relaxed),
            findings: findings.load(Ordering::Relaxed),
            duplicates: duplicates.load(Ordering::Relaxed),
            skipped: skipped.load(Ordering::Relaxed),
            interrupted: dropped.load(Ordering::Relaxed) > 0,
        }
    }

    /// Rotation history for the end-of-run report
    pub async fn rotation_events(&self) -> usize {
        self.ctx.circuits.events().await.len()
    }
}
