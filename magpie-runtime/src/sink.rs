//! Append-only CSV result streams
//!
//! Three files in the output directory: `findings.csv` for first sightings of
//! an address, `duplicates.csv` for repeat sightings, `skipped.csv` for URLs
//! that never got processed. Every row is flushed as it is written; a crash
//! loses at most the row in flight. Deduplication is global across the run,
//! keyed on the address string alone.

use chrono::{SecondsFormat, Utc};
use csv::Writer;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use magpie_core::Finding;

/// Result stream errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Output directory I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
}

struct Streams {
    findings: Writer<File>,
    duplicates: Writer<File>,
    skipped: Writer<File>,
    seen_addresses: HashSet<String>,
}

/// Thread-safe sink shared by all workers
pub struct ResultSink {
    streams: Mutex<Streams>,
}

fn open_stream(path: &Path, header: &[&str]) -> Result<Writer<File>, SinkError> {
    let exists = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if !exists {
        writer.write_record(header)?;
        writer.flush()?;
    }
    Ok(writer)
}

impl ResultSink {
    /// Open or resume the three streams under `out_dir`
    pub fn open(out_dir: &Path) -> Result<Self, SinkError> {
        std::fs::create_dir_all(out_dir)?;
        Ok(Self {
            streams: Mutex::new(Streams {
                findings: open_stream(
                    &out_dir.join("findings.csv"),
                    &[
                        "url",
                        "title",
                        "chain",
                        "address",
                        "timestamp",
                        "screenshot_path",
                        "categories",
                    ],
                )?,
                duplicates: open_stream(
                    &out_dir.join("duplicates.csv"),
                    &["url", "chain", "address", "timestamp"],
                )?,
                skipped: open_stream(&out_dir.join("skipped.csv"), &["url", "reason"])?,
                seen_addresses: HashSet::new(),
            }),
        })
    }

    /// Record a finding; returns `false` when the address was already seen
    pub fn emit(&self, finding: &Finding) -> Result<bool, SinkError> {
        let mut streams = self.streams.lock();
        let timestamp = finding
            .captured_at
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        if !streams.seen_addresses.insert(finding.address.clone()) {
            streams.duplicates.write_record([
                finding.url.as_str(),
                finding.chain.as_str(),
                finding.address.as_str(),
                timestamp.as_str(),
            ])?;
            streams.duplicates.flush()?;
            return Ok(false);
        }

        let categories =
            serde_json::to_string(&finding.categories).unwrap_or_else(|_| "[]".to_string());
        streams.findings.write_record([
            finding.url.as_str(),
            finding.title.as_str(),
            finding.chain.as_str(),
            finding.address.as_str(),
            timestamp.as_str(),
            finding.screenshot_path.as_str(),
            categories.as_str(),
        ])?;
        streams.findings.flush()?;

        info!("recorded {} {}", finding.chain, finding.address);
        Ok(true)
    }

    /// Record a URL the run gave up on
    pub fn skip(&self, url: &str, reason: &str) -> Result<(), SinkError> {
        let mut streams = self.streams.lock();
        streams.skipped.write_record([url, reason])?;
        streams.skipped.flush()?;
        Ok(())
    }

    /// Addresses recorded so far this run
    pub fn unique_count(&self) -> usize {
        self.streams.lock().seen_addresses.len()
    }

    /// Mark the address as already known without writing a row
    ///
    /// Used to seed the dedup set from a previous run's findings file.
    pub fn preload_address(&self, address: &str) {
        self.streams.lock().seen_addresses.insert(address.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use magpie_core::Chain;

    fn temp_out(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("magpie_sink_{}_{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn finding(address: &str) -> Finding {
        Finding::new("http://abc.onion", "Shop", Chain::Btc, address)
            .with_screenshot("shots/s.png")
            .with_categories(vec!["marketplace".into()])
    }

    #[test]
    fn test_first_sighting_then_duplicate() {
        let dir = temp_out("dup");
        let sink = ResultSink::open(&dir).unwrap();

        assert!(sink.emit(&finding("1BoatSLRHtKNngkdXEeobR76b53LETtpyT")).unwrap());
        assert!(!sink.emit(&finding("1BoatSLRHtKNngkdXEeobR76b53LETtpyT")).unwrap());
        assert_eq!(sink.unique_count(), 1);

        let findings = std::fs::read_to_string(dir.join("findings.csv")).unwrap();
        assert_eq!(findings.lines().count(), 2);
        assert!(findings.contains("1BoatSLRHtKNngkdXEeobR76b53LETtpyT"));

        let dups = std::fs::read_to_string(dir.join("duplicates.csv")).unwrap();
        assert_eq!(dups.lines().count(), 2);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_categories_serialized_as_json() {
        let dir = temp_out("cats");
        let sink = ResultSink::open(&dir).unwrap();
        sink.emit(&finding("1BoatSLRHtKNngkdXEeobR76b53LETtpyT")).unwrap();

        let findings = std::fs::read_to_string(dir.join("findings.csv")).unwrap();
        assert!(findings.contains(r#"[""marketplace""]"#) || findings.contains(r#"["marketplace"]"#));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_skip_stream() {
        let dir = temp_out("skip");
        let sink = ResultSink::open(&dir).unwrap();
        sink.skip("http://down.onion", "connection timeout").unwrap();

        let skipped = std::fs::read_to_string(dir.join("skipped.csv")).unwrap();
        assert!(skipped.contains("down.onion"));
        assert!(skipped.contains("connection timeout"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_preload_suppresses_rewrite() {
        let dir = temp_out("preload");
        let sink = ResultSink::open(&dir).unwrap();
        sink.preload_address("1BoatSLRHtKNngkdXEeobR76b53LETtpyT");
        assert!(!sink.emit(&finding("1BoatSLRHtKNngkdXEeobR76b53LETtpyT")).unwrap());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
