//! Switchyard CLI and REST API entry point.
//!
//! Binary name: `syard`
//!
//! Parses CLI arguments, loads configuration, wires the orchestrator and
//! persistence, then dispatches to a command handler or starts the REST API
//! server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;
use console::style;

use switchyard_infra::config::{default_config_path, resolve_data_dir};
use switchyard_observe::tracing_setup::{LogFormat, TracingOptions, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = TracingOptions {
        verbosity: cli.verbose,
        quiet: cli.quiet,
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        },
        otel: cli.otel,
    };
    if let Err(e) = init_tracing(&options) {
        eprintln!("Warning: failed to initialize tracing: {e}");
    }

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Commands that need no app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "syard", &mut std::io::stdout());
        return Ok(());
    }
    if let Commands::Config { action } = cli.command {
        let path = cli
            .config
            .unwrap_or_else(|| default_config_path(&resolve_data_dir()));
        return cli::config::handle_config_command(action, &path, cli.json).await;
    }

    // Initialize application state (config, DB, orchestrator)
    let state = AppState::init(cli.config.clone()).await?;

    match cli.command {
        Commands::Status => {
            cli::status::status(&state, cli.json).await?;
        }

        Commands::Rank { operation, hint } => {
            cli::rank::rank(&state, &operation, hint.into_hint(), cli.json).await?;
        }

        Commands::Execute {
            operation,
            params,
            hint,
        } => {
            let runtime = state.start(false).await;
            let result =
                cli::execute::execute(&state, &operation, &params, hint.into_hint(), cli.json).await;
            runtime.shutdown().await;
            state.persist_health().await?;
            result?;
        }

        Commands::Simulate {
            requests,
            concurrency,
            operation,
            pace_ms,
        } => {
            cli::simulate::simulate(&state, requests, concurrency, &operation, pace_ms, cli.json)
                .await?;
        }

        Commands::Analytics { limit } => {
            cli::analytics::analytics(&state, limit, cli.json).await?;
        }

        Commands::Audit {
            limit,
            provider,
            counts,
        } => {
            cli::audit::audit(&state, limit, provider.as_deref(), counts, cli.json).await?;
        }

        Commands::Serve { port, host } => {
            let runtime = state.start(true).await;

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Switchyard API listening on {}",
                style("⚡").bold(),
                style(format!("http://{addr}")).cyan()
            );
            println!("  {}", style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state.clone());

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            let stats = runtime.shutdown().await;
            let persisted = state.persist_health().await?;
            tracing::info!(
                audit_written = stats.written,
                health_persisted = persisted,
                "server stopped"
            );
            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } | Commands::Config { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
