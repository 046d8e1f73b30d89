//! Operation requests routed through the orchestrator.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Kind of trading operation. Open-ended: unknown kinds are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    PlaceOrder,
    CancelOrder,
    ModifyOrder,
    GetOrderStatus,
    GetMarketData,
    GetQuote,
    GetPortfolio,
    GetPositions,
    Custom(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::PlaceOrder => "place_order",
            OperationKind::CancelOrder => "cancel_order",
            OperationKind::ModifyOrder => "modify_order",
            OperationKind::GetOrderStatus => "get_order_status",
            OperationKind::GetMarketData => "get_market_data",
            OperationKind::GetQuote => "get_quote",
            OperationKind::GetPortfolio => "get_portfolio",
            OperationKind::GetPositions => "get_positions",
            OperationKind::Custom(name) => name,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "place_order" => OperationKind::PlaceOrder,
            "cancel_order" => OperationKind::CancelOrder,
            "modify_order" => OperationKind::ModifyOrder,
            "get_order_status" => OperationKind::GetOrderStatus,
            "get_market_data" => OperationKind::GetMarketData,
            "get_quote" => OperationKind::GetQuote,
            "get_portfolio" => OperationKind::GetPortfolio,
            "get_positions" => OperationKind::GetPositions,
            other => OperationKind::Custom(other.to_string()),
        })
    }
}

impl From<String> for OperationKind {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(kind) => kind,
            Err(never) => match never {},
        }
    }
}

impl From<&str> for OperationKind {
    fn from(s: &str) -> Self {
        OperationKind::from(s.to_string())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        kind.as_str().to_string()
    }
}

/// Caller-supplied routing preferences for a single request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingHint {
    /// Provider to try first (within its ranking partition).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefer: Option<String>,
    /// Providers that must not be attempted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
    /// Also consider providers whose health state is Unavailable.
    #[serde(default)]
    pub include_unavailable: bool,
}

impl RoutingHint {
    pub fn prefer(provider: impl Into<String>) -> Self {
        Self {
            prefer: Some(provider.into()),
            ..Self::default()
        }
    }

    pub fn excluding<I, S>(providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exclude: providers.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn is_excluded(&self, provider: &str) -> bool {
        self.exclude.iter().any(|p| p == provider)
    }
}

/// One request to execute. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRequest {
    pub operation: OperationKind,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<RoutingHint>,
}

impl OperationRequest {
    pub fn new(operation: impl Into<OperationKind>) -> Self {
        Self {
            operation: operation.into(),
            params: BTreeMap::new(),
            hint: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_hint(mut self, hint: RoutingHint) -> Self {
        self.hint = Some(hint);
        self
    }
}
