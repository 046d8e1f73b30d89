//! `syard analytics`: usage, distribution and optimization report.
//!
//! A one-shot process has no live event history, so the command replays the
//! most recent persisted execution records into the aggregator first.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_core::AnalyticsAggregator;
use switchyard_types::analytics::Severity;
use switchyard_types::event::OrchestratorEvent;

use crate::state::AppState;

pub async fn analytics(state: &AppState, limit: i64, json: bool) -> Result<()> {
    let records = state.execution_log.recent(limit, None).await?;
    // Oldest first so latency averages weight recent calls most.
    for record in records.iter().rev() {
        state
            .analytics
            .ingest(&OrchestratorEvent::Execution(record.clone()));
    }
    tracing::debug!(replayed = records.len(), "replayed audit log into analytics");

    print_report(&state.analytics, json)
}

/// Print rate usage, distribution and suggestions from `analytics`.
pub(crate) fn print_report(analytics: &AnalyticsAggregator, json: bool) -> Result<()> {
    let usage = analytics.rate_limit_analytics();
    let insights = analytics.load_balancing_insights();
    let suggestions = analytics.optimization_suggestions();
    let activity = analytics.activity();

    if json {
        let report = serde_json::json!({
            "rate_limits": usage,
            "load_balancing": insights,
            "activity": activity,
            "suggestions": suggestions,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("  {}", style("── Rate usage ──").dim());
    if usage.is_empty() {
        println!("  {}", style("no providers").dim());
    }
    for (provider, windows) in &usage {
        let line = windows
            .iter()
            .map(|(window, fraction)| format!("{window} {:.0}%", fraction * 100.0))
            .collect::<Vec<_>>()
            .join("  ");
        println!("  {:<16} {}", style(provider).bold(), line);
    }
    println!();

    println!("  {}", style("── Distribution ──").dim());
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Share").fg(Color::White),
        Cell::new("Successes").fg(Color::White),
        Cell::new("Failures").fg(Color::White),
        Cell::new("Timeouts").fg(Color::White),
        Cell::new("Avg Latency").fg(Color::White),
    ]);
    for (provider, share) in &insights.per_provider_share {
        let counters = activity.get(provider).cloned().unwrap_or_default();
        table.add_row(vec![
            Cell::new(provider),
            share_cell(*share),
            Cell::new(counters.successes),
            Cell::new(counters.failures),
            Cell::new(counters.timeouts),
            Cell::new(
                counters
                    .avg_latency_ms
                    .map(|ms| format!("{ms:.0}ms"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
    println!(
        "  Efficiency: {} over {} successful requests",
        style(format!("{:.2}", insights.efficiency)).bold(),
        insights.total_successes
    );
    println!();

    println!("  {}", style("── Suggestions ──").dim());
    if suggestions.is_empty() {
        println!("  {} Nothing to report.", style("✓").green());
    }
    for s in &suggestions {
        let marker = match s.severity {
            Severity::Critical => style("critical").red().bold(),
            Severity::Warning => style("warning ").yellow(),
            Severity::Info => style("info    ").blue(),
        };
        println!("  {marker} {}", s.suggestion);
    }
    println!();

    Ok(())
}

fn share_cell(share: f64) -> Cell {
    Cell::new(format!("{:.1}%", share * 100.0))
}
