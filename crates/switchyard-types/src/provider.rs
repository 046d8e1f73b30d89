//! Provider identity and rate-limit ceiling types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A sliding window over which a request ceiling applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateWindow {
    Second,
    Minute,
    Hour,
    Day,
}

impl RateWindow {
    /// All windows, shortest first.
    pub const ALL: [RateWindow; 4] = [
        RateWindow::Second,
        RateWindow::Minute,
        RateWindow::Hour,
        RateWindow::Day,
    ];

    /// Length of the window.
    pub fn duration(self) -> Duration {
        match self {
            RateWindow::Second => Duration::from_secs(1),
            RateWindow::Minute => Duration::from_secs(60),
            RateWindow::Hour => Duration::from_secs(3_600),
            RateWindow::Day => Duration::from_secs(86_400),
        }
    }
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateWindow::Second => write!(f, "second"),
            RateWindow::Minute => write!(f, "minute"),
            RateWindow::Hour => write!(f, "hour"),
            RateWindow::Day => write!(f, "day"),
        }
    }
}

impl FromStr for RateWindow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "second" | "sec" | "s" => Ok(RateWindow::Second),
            "minute" | "min" | "m" => Ok(RateWindow::Minute),
            "hour" | "h" => Ok(RateWindow::Hour),
            "day" | "d" => Ok(RateWindow::Day),
            other => Err(format!("invalid rate window: '{other}'")),
        }
    }
}

/// A request ceiling for one window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub window: RateWindow,
    pub max_requests: u32,
}

impl WindowLimit {
    pub fn new(window: RateWindow, max_requests: u32) -> Self {
        Self {
            window,
            max_requests,
        }
    }
}

/// Static configuration for one provider backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name (e.g., "alpaca", "tradier").
    pub name: String,
    /// Request ceilings, one per window. An empty list means unthrottled.
    #[serde(default)]
    pub limits: Vec<WindowLimit>,
    /// Static priority weight in [0, 1]; higher is preferred.
    #[serde(default = "default_priority")]
    pub priority: f64,
    /// Default invocation timeout for this provider in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether this provider takes part in routing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_priority() -> f64 {
    0.5
}

fn default_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Create a provider config with the given name and ceilings.
    pub fn new(name: impl Into<String>, limits: Vec<WindowLimit>) -> Self {
        Self {
            name: name.into(),
            limits,
            priority: default_priority(),
            timeout_ms: None,
            enabled: true,
        }
    }

    /// Builder-style priority override.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = priority;
        self
    }

    /// Builder-style timeout override.
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Ceiling configured for `window`, if any.
    pub fn limit_for(&self, window: RateWindow) -> Option<u32> {
        self.limits
            .iter()
            .find(|l| l.window == window)
            .map(|l| l.max_requests)
    }
}
