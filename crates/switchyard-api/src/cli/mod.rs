//! CLI command definitions for the `syard` binary.
//!
//! Uses clap derive macros for argument parsing. Every command runs against
//! the providers declared in `switchyard.toml`, backed by the simulated
//! provider implementation.

pub mod analytics;
pub mod audit;
pub mod config;
pub mod execute;
pub mod rank;
pub mod simulate;
pub mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};

use switchyard_types::health::HealthState;

/// Route trading operations across rate-limited providers.
#[derive(Parser)]
#[command(name = "syard", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export tracing spans via OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Path to the configuration file (defaults to `<data dir>/switchyard.toml`).
    #[arg(long, global = true, env = "SWITCHYARD_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provider health and rate usage overview.
    Status,

    /// Show how the providers for an operation would be ranked right now.
    Rank {
        /// Operation kind (e.g., get_quote, place_order).
        operation: String,

        #[command(flatten)]
        hint: HintArgs,
    },

    /// Execute one operation through its fallback chain.
    Execute {
        /// Operation kind (e.g., get_quote, place_order).
        operation: String,

        /// Request parameter as key=value (repeatable). Values parse as JSON
        /// when possible, otherwise as strings.
        #[arg(short, long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,

        #[command(flatten)]
        hint: HintArgs,
    },

    /// Drive a burst of requests through the orchestrator and report the outcome.
    Simulate {
        /// Total requests to send.
        #[arg(short = 'n', long, default_value = "100")]
        requests: usize,

        /// Requests in flight at once.
        #[arg(short, long, default_value = "4")]
        concurrency: usize,

        /// Operation kind to execute.
        #[arg(short, long, default_value = "get_market_data")]
        operation: String,

        /// Pause between request starts, in milliseconds.
        #[arg(long, default_value = "0")]
        pace_ms: u64,
    },

    /// Replay the persisted audit log into analytics and print the report.
    Analytics {
        /// How many recent execution records to replay.
        #[arg(long, default_value = "1000")]
        limit: i64,
    },

    /// Show recent execution records.
    Audit {
        /// Maximum records to show.
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Only records for this provider.
        #[arg(short, long)]
        provider: Option<String>,

        /// Show per-provider outcome counts instead of records.
        #[arg(long)]
        counts: bool,
    },

    /// Inspect configuration.
    Config {
        #[command(subcommand)]
        action: config::ConfigCommand,
    },

    /// Start the REST API server.
    Serve {
        /// Port to listen on.
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Routing hint flags shared by `rank` and `execute`.
#[derive(clap::Args, Debug, Default)]
pub struct HintArgs {
    /// Provider to try first within its ranking partition.
    #[arg(long)]
    pub prefer: Option<String>,

    /// Provider that must not be attempted (repeatable).
    #[arg(long)]
    pub exclude: Vec<String>,

    /// Also consider providers currently marked unavailable.
    #[arg(long)]
    pub include_unavailable: bool,
}

impl HintArgs {
    pub fn into_hint(self) -> Option<switchyard_types::operation::RoutingHint> {
        if self.prefer.is_none() && self.exclude.is_empty() && !self.include_unavailable {
            return None;
        }
        Some(switchyard_types::operation::RoutingHint {
            prefer: self.prefer,
            exclude: self.exclude,
            include_unavailable: self.include_unavailable,
        })
    }
}

/// Colored table cell for a health state.
pub(crate) fn health_cell(state: HealthState) -> Cell {
    let color = match state {
        HealthState::Available => Color::Green,
        HealthState::Degraded => Color::Yellow,
        HealthState::Recovering => Color::Cyan,
        HealthState::Unavailable => Color::Red,
    };
    Cell::new(state.to_string()).fg(color)
}

/// Colored percentage cell for a usage fraction.
pub(crate) fn usage_cell(fraction: f64) -> Cell {
    let color = if fraction >= 0.9 {
        Color::Red
    } else if fraction >= 0.8 {
        Color::Yellow
    } else {
        Color::Green
    };
    Cell::new(format!("{:.0}%", fraction * 100.0)).fg(color)
}

/// Truncate long messages for table display.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let kept: String = text.chars().take(max.saturating_sub(3)).collect();
        format!("{kept}...")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_execute_parses_params_and_hint() {
        let cli = Cli::try_parse_from([
            "syard",
            "execute",
            "place_order",
            "-p",
            "symbol=AAPL",
            "--param",
            "qty=10",
            "--prefer",
            "alpaca",
            "--exclude",
            "ib",
        ])
        .unwrap();
        let Commands::Execute {
            operation,
            params,
            hint,
        } = cli.command
        else {
            panic!("expected execute");
        };
        assert_eq!(operation, "place_order");
        assert_eq!(params, vec!["symbol=AAPL", "qty=10"]);
        let hint = hint.into_hint().unwrap();
        assert_eq!(hint.prefer.as_deref(), Some("alpaca"));
        assert_eq!(hint.exclude, vec!["ib"]);
    }

    #[test]
    fn test_empty_hint_is_none() {
        assert!(HintArgs::default().into_hint().is_none());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long error message", 10), "a very ...");
    }
}
