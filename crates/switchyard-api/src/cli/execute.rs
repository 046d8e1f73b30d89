//! `syard execute`: run one operation through its fallback chain.

use anyhow::{Result, bail};
use console::style;

use switchyard_types::error::OrchestratorError;
use switchyard_types::operation::{OperationRequest, RoutingHint};

use crate::state::AppState;

/// Parse a `key=value` parameter. The value is read as JSON when it parses
/// (numbers, booleans, quoted strings, objects) and as a plain string otherwise.
pub(crate) fn parse_param(raw: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, value)) = raw.split_once('=') else {
        bail!("invalid parameter '{raw}': expected KEY=VALUE");
    };
    let key = key.trim();
    if key.is_empty() {
        bail!("invalid parameter '{raw}': empty key");
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

pub async fn execute(
    state: &AppState,
    operation: &str,
    params: &[String],
    hint: Option<RoutingHint>,
    json: bool,
) -> Result<()> {
    let mut request = OperationRequest::new(operation);
    for raw in params {
        let (key, value) = parse_param(raw)?;
        request = request.with_param(key, value);
    }
    if let Some(hint) = hint {
        request = request.with_hint(hint);
    }

    let result = state.orchestrator.execute(&request).await;

    match result {
        Ok(outcome) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }
            println!();
            println!(
                "  {} {} served by {} in {}ms",
                style("✓").green().bold(),
                style(&outcome.operation).cyan(),
                style(&outcome.provider).bold(),
                outcome.latency_ms
            );
            for failure in &outcome.attempts {
                println!(
                    "    {} {}",
                    style("skipped").dim(),
                    style(failure).dim()
                );
            }
            println!();
            println!("{}", serde_json::to_string_pretty(&outcome.payload)?);
            println!();
            Ok(())
        }
        Err(OrchestratorError::AllProvidersExhausted { operation, failures }) => {
            if json {
                let body = serde_json::json!({
                    "error": "all_providers_exhausted",
                    "operation": operation,
                    "failures": failures,
                });
                println!("{}", serde_json::to_string_pretty(&body)?);
            } else {
                println!();
                println!(
                    "  {} All providers exhausted for {}",
                    style("✗").red().bold(),
                    style(&operation).cyan()
                );
                for failure in &failures {
                    println!("    {} {}", style("•").red(), failure);
                }
                println!();
            }
            bail!("all providers exhausted for {operation}")
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param_json_and_string() {
        assert_eq!(
            parse_param("qty=10").unwrap(),
            ("qty".to_string(), serde_json::json!(10))
        );
        assert_eq!(
            parse_param("symbol=AAPL").unwrap(),
            ("symbol".to_string(), serde_json::json!("AAPL"))
        );
        assert_eq!(
            parse_param("extended=true").unwrap(),
            ("extended".to_string(), serde_json::json!(true))
        );
        assert_eq!(
            parse_param("note=a=b").unwrap(),
            ("note".to_string(), serde_json::json!("a=b"))
        );
    }

    #[test]
    fn test_parse_param_rejects_missing_separator() {
        assert!(parse_param("symbol").is_err());
        assert!(parse_param("=x").is_err());
    }
}
