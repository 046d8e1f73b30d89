//! System status dashboard command.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use crate::cli::{health_cell, truncate, usage_cell};
use crate::state::AppState;

/// Display configured providers with their health and current rate usage.
pub async fn status(state: &AppState, json: bool) -> Result<()> {
    let config = state.orchestrator.config().await;
    let health = state.orchestrator.health();
    let limiter = state.orchestrator.limiter();

    if json {
        let providers: Vec<serde_json::Value> = config
            .providers
            .iter()
            .map(|p| {
                serde_json::json!({
                    "config": p,
                    "health": health.health(&p.name),
                    "usage": limiter.snapshot(&p.name),
                })
            })
            .collect();
        let status = serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "data_dir": state.data_dir.display().to_string(),
            "config": state.config_source(),
            "providers": providers,
            "routes": config.routing,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Switchyard v{}",
        style("⚡").bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    if config.providers.is_empty() {
        println!(
            "  {} No providers configured. Add [[providers]] to {}",
            style("i").blue().bold(),
            style(state.config_source()).cyan()
        );
        println!();
        return Ok(());
    }

    println!("  {}", style("── Providers ──").dim());
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Provider").fg(Color::White),
        Cell::new("Health").fg(Color::White),
        Cell::new("Usage").fg(Color::White),
        Cell::new("Limits").fg(Color::White),
        Cell::new("Priority").fg(Color::White),
        Cell::new("Latency").fg(Color::White),
        Cell::new("Calls").fg(Color::White),
        Cell::new("Last Error").fg(Color::White),
    ]);

    for provider in &config.providers {
        let snapshot = health.health(&provider.name);
        let limits = provider
            .limits
            .iter()
            .map(|l| format!("{}/{}", l.max_requests, l.window))
            .collect::<Vec<_>>()
            .join(", ");
        let name_cell = if provider.enabled {
            Cell::new(&provider.name)
        } else {
            Cell::new(format!("{} (disabled)", provider.name)).fg(Color::DarkGrey)
        };
        let (health, latency, calls, last_error) = match &snapshot {
            Some(s) => (
                health_cell(s.state),
                s.avg_latency_ms
                    .map(|ms| format!("{ms:.0}ms"))
                    .unwrap_or_else(|| "-".to_string()),
                format!("{} ({} failed)", s.total_calls, s.total_failures),
                truncate(s.last_error.as_deref().unwrap_or("-"), 40),
            ),
            None => (
                Cell::new("-"),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ),
        };
        table.add_row(vec![
            name_cell,
            health,
            usage_cell(limiter.max_usage_fraction(&provider.name)),
            Cell::new(if limits.is_empty() { "unlimited".to_string() } else { limits }),
            Cell::new(format!("{:.2}", provider.priority)),
            Cell::new(latency),
            Cell::new(calls),
            Cell::new(last_error),
        ]);
    }
    println!("{table}");
    println!();

    println!("  {}", style("── Routes ──").dim());
    if config.routing.is_empty() {
        println!("  {}", style("none").dim());
    }
    for (operation, chain) in &config.routing {
        println!(
            "  {:<18} {}",
            style(operation).cyan(),
            chain.join(" → ")
        );
    }
    println!();

    println!("  {}", style("── System ──").dim());
    println!("  Config:   {}", style(state.config_source()).dim());
    println!("  Data dir: {}", style(state.data_dir.display()).dim());
    println!("  Database: {}", style("SQLite (WAL mode)").dim());
    println!();

    Ok(())
}
