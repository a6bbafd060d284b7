//! Drive a hand from JSON-lines predictions on stdin.
//!
//! ```text
//! gesture-bridge [config.yaml] < predictions.jsonl
//! ```
//!
//! Each line is `{"timestamp": 1.25, "prediction": 3, "probability": 0.9}`;
//! `exit` or end of input stops the pipeline. Without a config file the
//! defaults are used with the hand on a virtual transport.

use anyhow::Context;
use gesturelink::{GestureLink, LinkConfig, PredictionMessage, TransportMode};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gesturelink=info,gesture_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => LinkConfig::load(&path).with_context(|| format!("loading {path}"))?,
        None => {
            let mut config = LinkConfig::default();
            config.hand.transport = Some(TransportMode::Virtual);
            info!("No configuration given, using a virtual hand");
            config
        }
    };

    let session = GestureLink::start(&config).context("starting gesture pipeline")?;
    let predictions = session.predictions();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number = 0u64;
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        line_number += 1;
        match PredictionMessage::parse_line(&line) {
            Ok(None) => continue,
            Ok(Some(PredictionMessage::EndOfStream)) => break,
            Ok(Some(message)) => {
                if predictions.send(message).await.is_err() {
                    warn!("Pipeline stopped, ignoring further input");
                    break;
                }
            }
            Err(e) => warn!(line = line_number, "Skipping input: {}", e),
        }
    }

    // The session's own sender carries the end-of-stream marker
    drop(predictions);
    let report = session.finish().await?;
    info!(
        outcome = ?report.outcome,
        received = report.stats.received,
        dispatched = report.stats.dispatched,
        suppressed = report.stats.suppressed,
        "Done"
    );
    if let Some(e) = report.error {
        for suggestion in e.recovery_suggestions() {
            eprintln!("  - {suggestion}");
        }
        return Err(e).context("pipeline failed");
    }
    Ok(())
}
