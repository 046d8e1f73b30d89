//! `syard config`: validate and display configuration.

use std::path::Path;

use anyhow::Result;
use clap::Subcommand;
use console::style;

use switchyard_infra::config::load_config;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Parse and validate the configuration file without starting anything.
    Check,

    /// Print the effective configuration, defaults included, as TOML.
    Show,
}

pub async fn handle_config_command(cmd: ConfigCommand, path: &Path, json: bool) -> Result<()> {
    match cmd {
        ConfigCommand::Check => check(path, json).await,
        ConfigCommand::Show => show(path, json).await,
    }
}

async fn check(path: &Path, json: bool) -> Result<()> {
    match load_config(path).await {
        Ok(loaded) => {
            let config = &loaded.orchestrator;
            if json {
                let body = serde_json::json!({
                    "valid": true,
                    "path": path.display().to_string(),
                    "exists": loaded.source.is_some(),
                    "providers": config.providers.len(),
                    "routes": config.routing.len(),
                    "simulation_profiles": loaded.simulation.len(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
                return Ok(());
            }
            println!();
            if loaded.source.is_none() {
                println!(
                    "  {} {} does not exist; defaults apply",
                    style("i").blue().bold(),
                    style(path.display()).cyan()
                );
            } else {
                println!(
                    "  {} {} is valid",
                    style("✓").green().bold(),
                    style(path.display()).cyan()
                );
            }
            println!(
                "    {} providers, {} routes, {} simulation profiles",
                config.providers.len(),
                config.routing.len(),
                loaded.simulation.len()
            );
            println!();
            Ok(())
        }
        Err(e) => {
            if json {
                let body = serde_json::json!({
                    "valid": false,
                    "path": path.display().to_string(),
                    "error": e.to_string(),
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!();
                println!(
                    "  {} {}: {}",
                    style("✗").red().bold(),
                    style(path.display()).cyan(),
                    e
                );
                println!();
            }
            Err(e.into())
        }
    }
}

async fn show(path: &Path, json: bool) -> Result<()> {
    let loaded = load_config(path).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.orchestrator)?);
    } else {
        println!("{}", toml::to_string_pretty(&loaded.orchestrator)?);
    }
    Ok(())
}
