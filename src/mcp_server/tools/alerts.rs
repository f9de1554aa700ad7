//! Alert feed tools: `get_recent_alerts` and `get_alert_details`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp_server::handler::{HandlerError, Tool};
use crate::protocol::{FieldKind, FieldSpec, InputSchema};

/// Upper bound on alerts returned by one `get_recent_alerts` call.
pub const MAX_ALERTS: u64 = 10;

/// Default for `get_recent_alerts.limit`.
pub const DEFAULT_ALERT_LIMIT: u64 = 5;

// ─── Alert Store ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub source_ip: String,
    pub destination_ip: String,
    pub event_type: String,
    pub severity: Severity,
    pub attempts: u64,
}

#[derive(Debug, Error)]
pub enum AlertStoreError {
    #[error("failed to read alerts file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse alerts file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Read-only alert log, newest first.
#[derive(Debug, Clone, Default)]
pub struct AlertStore {
    alerts: Vec<Alert>,
}

impl AlertStore {
    pub fn new(alerts: Vec<Alert>) -> Self {
        Self { alerts }
    }

    /// The simulated SIEM feed shipped with the host.
    pub fn builtin() -> Self {
        let raw = json!([
            {"id": "ALT-001", "timestamp": "2024-01-15T10:23:00Z", "source_ip": "185.220.101.45",
             "destination_ip": "10.0.1.22", "event_type": "SSH Brute Force", "severity": "HIGH", "attempts": 847},
            {"id": "ALT-002", "timestamp": "2024-01-15T10:25:00Z", "source_ip": "192.168.1.105",
             "destination_ip": "10.0.1.5", "event_type": "Port Scan", "severity": "MEDIUM", "attempts": 12},
            {"id": "ALT-003", "timestamp": "2024-01-15T10:27:00Z", "source_ip": "45.33.32.156",
             "destination_ip": "10.0.1.44", "event_type": "Suspicious Outbound Connection", "severity": "HIGH", "attempts": 3},
            {"id": "ALT-004", "timestamp": "2024-01-15T10:30:00Z", "source_ip": "10.0.0.52",
             "destination_ip": "8.8.8.8", "event_type": "Unusual DNS Volume", "severity": "MEDIUM", "attempts": 1203},
            {"id": "ALT-005", "timestamp": "2024-01-15T10:31:00Z", "source_ip": "89.248.167.131",
             "destination_ip": "10.0.1.10", "event_type": "Possible Data Exfiltration", "severity": "CRITICAL", "attempts": 1}
        ]);
        // Fixed data, checked by test_builtin_feed.
        Self::new(serde_json::from_value(raw).unwrap_or_default())
    }

    /// Load a JSON array of alerts.
    pub fn from_json_file(path: &Path) -> Result<Self, AlertStoreError> {
        let display = path.display().to_string();
        let content = std::fs::read_to_string(path).map_err(|source| AlertStoreError::Read {
            path: display.clone(),
            source,
        })?;
        let alerts = serde_json::from_str(&content).map_err(|source| AlertStoreError::Parse {
            path: display,
            source,
        })?;
        Ok(Self::new(alerts))
    }

    pub fn recent(&self, limit: usize) -> &[Alert] {
        &self.alerts[..limit.min(self.alerts.len())]
    }

    pub fn get(&self, id: &str) -> Option<&Alert> {
        self.alerts.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

// ─── get_recent_alerts ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RecentAlertsArgs {
    #[serde(default)]
    pub limit: Option<i64>,
}

pub struct RecentAlerts {
    store: Arc<AlertStore>,
}

impl RecentAlerts {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for RecentAlerts {
    type Args = RecentAlertsArgs;

    fn name(&self) -> &str {
        "get_recent_alerts"
    }

    fn description(&self) -> &str {
        "Retrieve recent security alerts from the SOC log store. Use this tool first to see \
         what security events need investigation. Returns a list of alerts including source \
         IPs, event types, and severity."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::optional("limit", FieldKind::Integer)
                .describe("How many recent alerts to return (default: 5, max: 10)")
                .with_default(json!(DEFAULT_ALERT_LIMIT)),
        )
    }

    async fn call(&self, args: RecentAlertsArgs) -> Result<Value, HandlerError> {
        let limit = args.limit.unwrap_or(DEFAULT_ALERT_LIMIT as i64);
        if limit < 0 {
            return Err(HandlerError::new(format!(
                "limit must be non-negative, got {limit}"
            )));
        }
        let limit = (limit as u64).min(MAX_ALERTS) as usize;

        let alerts = self.store.recent(limit);
        Ok(json!({
            "alert_count": alerts.len(),
            "alerts": alerts,
        }))
    }
}

// ─── get_alert_details ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AlertDetailsArgs {
    pub alert_id: String,
}

pub struct AlertDetails {
    store: Arc<AlertStore>,
}

impl AlertDetails {
    pub fn new(store: Arc<AlertStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for AlertDetails {
    type Args = AlertDetailsArgs;

    fn name(&self) -> &str {
        "get_alert_details"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific alert by its ID. Use this when you need \
         more context about a particular security event."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::required("alert_id", FieldKind::String)
                .describe("The alert identifier (e.g., 'ALT-001')"),
        )
    }

    async fn call(&self, args: AlertDetailsArgs) -> Result<Value, HandlerError> {
        let alert = self
            .store
            .get(args.alert_id.trim())
            .ok_or_else(|| HandlerError::new(format!("Alert {} not found", args.alert_id)))?;
        serde_json::to_value(alert).map_err(|e| HandlerError::new(e.to_string()))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
