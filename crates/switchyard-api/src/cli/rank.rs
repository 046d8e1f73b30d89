//! `syard rank`: show the current ranking for an operation.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use switchyard_core::balancer::{Partition, Ranking};
use switchyard_types::operation::{OperationKind, RoutingHint};

use crate::cli::{health_cell, usage_cell};
use crate::state::AppState;

pub async fn rank(
    state: &AppState,
    operation: &str,
    hint: Option<RoutingHint>,
    json: bool,
) -> Result<()> {
    let operation = OperationKind::from(operation);
    let ranking = state.orchestrator.rank(&operation, hint.as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ranking)?);
        return Ok(());
    }

    print_ranking(&ranking);
    Ok(())
}

pub(crate) fn print_ranking(ranking: &Ranking) {
    println!();
    println!(
        "  {} Ranking for {}",
        style("⇅").bold(),
        style(&ranking.operation).cyan().bold()
    );
    println!();

    if ranking.candidates.is_empty() {
        println!("  {}", style("No routable providers.").yellow());
    } else {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("#").fg(Color::White),
            Cell::new("Provider").fg(Color::White),
            Cell::new("Score").fg(Color::White),
            Cell::new("Partition").fg(Color::White),
            Cell::new("Usage").fg(Color::White),
            Cell::new("Health").fg(Color::White),
            Cell::new("Headroom").fg(Color::White),
            Cell::new("Latency").fg(Color::White),
            Cell::new("Success").fg(Color::White),
            Cell::new("Priority").fg(Color::White),
            Cell::new("Penalty").fg(Color::White),
        ]);

        for (i, c) in ranking.candidates.iter().enumerate() {
            let partition = match c.partition {
                Partition::Normal => Cell::new("normal").fg(Color::Green),
                Partition::NearLimit => Cell::new("near limit").fg(Color::Yellow),
                Partition::Unavailable => Cell::new("unavailable").fg(Color::Red),
            };
            let mut name = c.provider.clone();
            if c.preferred {
                name.push_str(" ★");
            }
            if c.spike_predicted {
                name.push_str(" ↗");
            }
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(name),
                Cell::new(format!("{:.3}", c.score)),
                partition,
                usage_cell(c.max_usage),
                health_cell(c.health),
                Cell::new(format!("{:.3}", c.breakdown.rate_headroom)),
                Cell::new(format!("{:.3}", c.breakdown.latency)),
                Cell::new(format!("{:.3}", c.breakdown.success_rate)),
                Cell::new(format!("{:.3}", c.breakdown.priority)),
                Cell::new(format!("-{:.3}", c.breakdown.penalty)),
            ]);
        }
        println!("{table}");
    }

    if !ranking.excluded.is_empty() {
        println!();
        println!("  {}", style("── Excluded ──").dim());
        for e in &ranking.excluded {
            println!("  {} {:?}", style(&e.provider).dim(), e.reason);
        }
    }
    println!();
    println!(
        "  {}",
        style("★ preferred by hint   ↗ usage spike predicted").dim()
    );
    println!();
}
