//! Dry-run ranking handler.

use std::time::Instant;

use axum::extract::{Path, Query, State};
use serde::Deserialize;

use switchyard_core::balancer::Ranking;
use switchyard_types::operation::{OperationKind, RoutingHint};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters mirroring [`RoutingHint`]. `exclude` is comma-separated.
#[derive(Debug, Default, Deserialize)]
pub struct RankQuery {
    pub prefer: Option<String>,
    pub exclude: Option<String>,
    #[serde(default)]
    pub include_unavailable: bool,
}

impl RankQuery {
    fn into_hint(self) -> Option<RoutingHint> {
        let exclude: Vec<String> = self
            .exclude
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        if self.prefer.is_none() && exclude.is_empty() && !self.include_unavailable {
            return None;
        }
        Some(RoutingHint {
            prefer: self.prefer,
            exclude,
            include_unavailable: self.include_unavailable,
        })
    }
}

/// GET /api/v1/routing/{operation} - Rank candidates without executing.
pub async fn rank_operation(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    Query(query): Query<RankQuery>,
) -> Result<ApiResponse<Ranking>, AppError> {
    let start = Instant::now();
    let operation = OperationKind::from(operation);
    let hint = query.into_hint();

    let ranking = state.orchestrator.rank(&operation, hint.as_ref()).await?;

    Ok(ApiResponse::success(ranking, start)
        .with_link("self", &format!("/api/v1/routing/{operation}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_has_no_hint() {
        assert!(RankQuery::default().into_hint().is_none());
    }

    #[test]
    fn test_exclude_is_split_and_trimmed() {
        let hint = RankQuery {
            prefer: Some("alpaca".to_string()),
            exclude: Some("tradier, ib,,".to_string()),
            include_unavailable: false,
        }
        .into_hint()
        .unwrap();
        assert_eq!(hint.prefer.as_deref(), Some("alpaca"));
        assert_eq!(hint.exclude, vec!["tradier", "ib"]);
    }
}
