//! `syard audit`: browse the persisted execution log.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_types::record::AttemptOutcome;

use crate::cli::truncate;
use crate::state::AppState;

pub async fn audit(
    state: &AppState,
    limit: i64,
    provider: Option<&str>,
    counts: bool,
    json: bool,
) -> Result<()> {
    if counts {
        return audit_counts(state, json).await;
    }

    let records = state.execution_log.recent(limit, provider).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!();
        println!(
            "  {} No execution records yet. Try {}",
            style("i").blue().bold(),
            style("syard execute <operation>").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time").fg(Color::White),
        Cell::new("Request").fg(Color::White),
        Cell::new("Provider").fg(Color::White),
        Cell::new("Operation").fg(Color::White),
        Cell::new("Attempt").fg(Color::White),
        Cell::new("Outcome").fg(Color::White),
        Cell::new("Latency").fg(Color::White),
        Cell::new("Error").fg(Color::White),
    ]);

    for record in &records {
        let outcome = match record.outcome {
            AttemptOutcome::Success => Cell::new("success").fg(Color::Green),
            AttemptOutcome::Failure => Cell::new("failure").fg(Color::Red),
            AttemptOutcome::Cancelled => Cell::new("cancelled").fg(Color::Yellow),
        };
        let request = record.request_id.to_string();
        let error = match (&record.error_kind, &record.error_message) {
            (Some(kind), Some(message)) => truncate(&format!("{kind}: {message}"), 48),
            (Some(kind), None) => kind.to_string(),
            _ => "-".to_string(),
        };
        table.add_row(vec![
            Cell::new(record.timestamp.format("%H:%M:%S%.3f")),
            Cell::new(&request[request.len().saturating_sub(8)..]),
            Cell::new(&record.provider),
            Cell::new(&record.operation),
            Cell::new(record.attempt),
            outcome,
            Cell::new(format!("{}ms", record.latency_ms)),
            Cell::new(error),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

async fn audit_counts(state: &AppState, json: bool) -> Result<()> {
    let counts = state.execution_log.counts().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Successes").fg(Color::White),
        Cell::new("Failures").fg(Color::White),
        Cell::new("Cancelled").fg(Color::White),
    ]);
    for c in &counts {
        table.add_row(vec![
            Cell::new(&c.provider),
            Cell::new(c.successes).fg(Color::Green),
            Cell::new(c.failures).fg(if c.failures > 0 { Color::Red } else { Color::White }),
            Cell::new(c.cancelled),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
