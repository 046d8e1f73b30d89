//! `syard simulate`: push a burst of requests through the orchestrator.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use switchyard_types::operation::OperationRequest;

use crate::cli::analytics::print_report;
use crate::state::AppState;

#[derive(Debug, Default, Serialize)]
struct SimulationSummary {
    requests: usize,
    served: usize,
    exhausted: usize,
    elapsed_ms: u64,
    served_by: BTreeMap<String, usize>,
    fallbacks: usize,
}

/// Offset of the `index`-th request when requests are spaced `pace` apart.
/// Saturates instead of overflowing for very large paces or counts.
fn start_delay(pace: Duration, index: usize) -> Duration {
    pace.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

pub async fn simulate(
    state: &AppState,
    requests: usize,
    concurrency: usize,
    operation: &str,
    pace_ms: u64,
    json: bool,
) -> Result<()> {
    if concurrency == 0 {
        bail!("concurrency must be at least 1");
    }
    let request = OperationRequest::new(operation);
    let runtime = state.start(true).await;

    let progress = if json {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(requests as u64);
        bar.set_style(
            ProgressStyle::with_template("  {spinner} [{bar:30}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar
    };

    let started = Instant::now();
    let pace = Duration::from_millis(pace_ms);
    let results: Vec<_> = futures_util::stream::iter(0..requests)
        .map(|i| {
            let orchestrator = state.orchestrator.clone();
            let request = request.clone();
            let progress = progress.clone();
            async move {
                if !pace.is_zero() {
                    tokio::time::sleep(start_delay(pace, i)).await;
                }
                let result = orchestrator.execute(&request).await;
                progress.inc(1);
                result
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;
    progress.finish_and_clear();

    let mut summary = SimulationSummary {
        requests,
        elapsed_ms: started.elapsed().as_millis() as u64,
        ..SimulationSummary::default()
    };
    for result in &results {
        match result {
            Ok(outcome) => {
                summary.served += 1;
                *summary.served_by.entry(outcome.provider.clone()).or_default() += 1;
                if !outcome.attempts.is_empty() {
                    summary.fallbacks += 1;
                }
            }
            Err(e) => {
                summary.exhausted += 1;
                tracing::debug!(error = %e, "simulated request failed");
            }
        }
    }

    let stats = runtime.shutdown().await;
    tracing::debug!(written = stats.written, "audit records flushed");
    state.persist_health().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return print_report(&state.analytics, true);
    }

    println!();
    println!(
        "  {} {} requests for {} in {}ms",
        style("⚡").bold(),
        summary.requests,
        style(&request.operation).cyan(),
        summary.elapsed_ms
    );
    println!(
        "  Served: {}   Exhausted: {}   Needed fallback: {}",
        style(summary.served).green().bold(),
        if summary.exhausted > 0 {
            style(summary.exhausted).red().bold()
        } else {
            style(summary.exhausted).dim()
        },
        summary.fallbacks
    );
    println!();

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Served").fg(Color::White),
    ]);
    for (provider, served) in &summary.served_by {
        table.add_row(vec![Cell::new(provider), Cell::new(served)]);
    }
    println!("{table}");

    print_report(&state.analytics, false)
}
