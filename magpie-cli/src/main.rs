//! Magpie CLI
//!
//! Adaptive hidden-service crawler: feeds a URL list through the engine and
//! streams extracted payment addresses to CSV.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use magpie_runtime::{Engine, EngineConfig, Summary};
use magpie_strategies::OracleConfig;
use magpie_tor::TorConfig;

#[derive(Parser)]
#[command(name = "magpie")]
#[command(author, version, about = "Magpie: hidden-service payment address harvester", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (0-3)
    #[arg(short, long, default_value = "1")]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl a list of onion URLs and harvest addresses
    Run {
        /// Input file: one URL per line, or a CSV whose first column is the URL
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for CSV streams and screenshots
        #[arg(short, long, default_value = "magpie-out")]
        output: PathBuf,

        /// Concurrent browser workers
        #[arg(short, long, default_value = "8")]
        workers: usize,

        /// Tor SOCKS proxy address
        #[arg(long, default_value = "socks5h://127.0.0.1:9050")]
        socks: String,

        /// Tor control port address
        #[arg(long, default_value = "127.0.0.1:9051")]
        control: String,

        /// Tor control port password (or set TOR_CONTROL_PASSWORD)
        #[arg(long, env = "TOR_CONTROL_PASSWORD", default_value = "")]
        control_password: String,

        /// Rotate the circuit after this many URLs
        #[arg(long, default_value = "30")]
        rotate_after: u64,

        /// Page load timeout in seconds
        #[arg(long, default_value = "45")]
        page_timeout: u64,

        /// OpenAI-compatible API key for CAPTCHA solving and identities
        #[arg(long, env = "OPENAI_API_KEY")]
        api_key: Option<String>,

        /// Model for the oracle
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        /// Base URL override for OpenRouter or local LLM servers
        #[arg(long)]
        api_base: Option<String>,

        /// Strategy learner state file
        #[arg(long, default_value = "magpie-out/patterns.json")]
        pattern_state: PathBuf,

        /// Transaction-flow learner state file
        #[arg(long, default_value = "magpie-out/flows.json")]
        flow_state: PathBuf,
    },

    /// Check Tor connection status
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => Level::ERROR,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    match run(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("❌ {:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Run {
            input,
            output,
            workers,
            socks,
            control,
            control_password,
            rotate_after,
            page_timeout,
            api_key,
            model,
            api_base,
            pattern_state,
            flow_state,
        } => {
            let urls = read_urls(&input)?;
            if urls.is_empty() {
                anyhow::bail!("no URLs found in {}", input.display());
            }

            let tor = TorConfig {
                socks_addr: socks,
                control_addr: control,
                control_password,
                page_timeout_secs: page_timeout,
                rotate_after_urls: rotate_after,
                ..TorConfig::default()
            };

            println!("🔌 Checking Tor connection...");
            match magpie_tor::check_tor_connection(&tor).await {
                Ok(true) => println!("✅ Tor connection OK\n"),
                Ok(false) => {
                    eprintln!("❌ Tor proxy unreachable at {}", tor.socks_addr);
                    eprintln!("   Start Tor first: sudo systemctl start tor");
                    return Ok(ExitCode::from(2));
                }
                Err(e) => {
                    eprintln!("❌ Tor check failed: {}", e);
                    return Ok(ExitCode::from(2));
                }
            }

            let oracle = api_key.map(|key| {
                let mut config = OracleConfig::openai(&key, &model);
                config.base_url = api_base;
                config
            });
            match &oracle {
                Some(c) => println!("🧠 Oracle: {}", c.model),
                None => println!("🧠 Oracle: disabled (no API key)"),
            }
            println!("🕸️  {} URLs, {} workers\n", urls.len(), workers);

            let engine = Engine::new(EngineConfig {
                tor,
                workers,
                output_dir: output.clone(),
                pattern_state_path: pattern_state,
                flow_state_path: flow_state,
                oracle,
            })
            .context("opening output streams")?;

            let summary = engine.run(urls).await;
            let rotations = engine.rotation_events().await;
            print_summary(&summary, rotations, &output);

            Ok(if summary.interrupted {
                ExitCode::from(130)
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Status => check_status().await,
    }
}

/// Read the URL list; bare hosts get an `http://` prefix
fn read_urls(path: &PathBuf) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;

    let mut urls = Vec::new();
    for line in text.lines() {
        let candidate = line.split(',').next().unwrap_or("").trim();
        if candidate.is_empty() || candidate.starts_with('#') || candidate == "url" {
            continue;
        }
        if candidate.starts_with("http://") || candidate.starts_with("https://") {
            urls.push(candidate.to_string());
        } else {
            urls.push(format!("http://{}", candidate));
        }
    }
    Ok(urls)
}

fn print_summary(summary: &Summary, rotations: usize, output: &PathBuf) {
    println!("\n{}", "=".repeat(60));
    if summary.interrupted {
        println!("⚠️  Run interrupted; queued URLs were dropped");
    } else {
        println!("✅ Run complete");
    }
    println!("   URLs processed:  {}", summary.processed);
    println!("   New addresses:   {}", summary.findings);
    println!("   Duplicates:      {}", summary.duplicates);
    println!("   Skipped URLs:    {}", summary.skipped);
    println!("   Circuit rotations: {}", rotations);
    println!("📄 Results in {}", output.display());
}

async fn check_status() -> Result<ExitCode> {
    println!("🔌 Checking Tor connection...\n");
    let config = TorConfig::default();

    match magpie_tor::check_tor_connection(&config).await {
        Ok(true) => {
            println!("✅ Tor is running and accessible");
            println!("   Proxy: {}", config.socks_addr);
            Ok(ExitCode::SUCCESS)
        }
        Ok(false) => {
            println!("❌ Tor is not accessible");
            println!("   Expected proxy at: {}", config.socks_addr);
            println!("\n   To install Tor:");
            println!("   - Linux: sudo apt install tor");
            println!("   - Mac: brew install tor");
            println!("   - Then start: sudo systemctl start tor");
            Ok(ExitCode::from(2))
        }
        Err(e) => {
            println!("❌ Error checking Tor: {}", e);
            Ok(ExitCode::from(2))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_urls_prefixes_and_filters() {
        let path = std::env::temp_dir().join(format!("magpie_urls_{}.csv", std::process::id()));
        std::fs::write(
            &path,
            "url,notes\nabcdef.onion,market\nhttp://ghijkl.onion/shop,\n# comment\n\n",
        )
        .unwrap();

        let urls = read_urls(&path).unwrap();
        assert_eq!(
            urls,
            vec![
                "http://abcdef.onion".to_string(),
                "http://ghijkl.onion/shop".to_string(),
            ]
        );
        let _ = std::fs::remove_file(&path);
    }
}
