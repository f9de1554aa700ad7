//! `check_ip_reputation`: lookup against a threat-intel table.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::mcp_server::handler::{HandlerError, Tool};
use crate::protocol::{FieldKind, FieldSpec, InputSchema};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatIndicator {
    pub threat: String,
    pub confidence: u8,
}

/// Known-bad IP table.
#[derive(Debug, Clone, Default)]
pub struct ThreatIntel {
    indicators: HashMap<IpAddr, ThreatIndicator>,
}

impl ThreatIntel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: IpAddr, threat: &str, confidence: u8) -> Self {
        self.indicators.insert(
            ip,
            ThreatIndicator {
                threat: threat.to_string(),
                confidence: confidence.min(100),
            },
        );
        self
    }

    /// The lab feed shipped with the host.
    pub fn builtin() -> Self {
        [
            (Ipv4Addr::new(185, 220, 101, 45), "Tor Exit Node", 90u8),
            (Ipv4Addr::new(192, 42, 116, 16), "Port Scanning", 75),
            (Ipv4Addr::new(45, 33, 32, 156), "Known C2 Server", 88),
            (Ipv4Addr::new(198, 199, 10, 1), "Brute Force Source", 72),
            (Ipv4Addr::new(89, 248, 167, 131), "Malware Distribution", 95),
        ]
        .into_iter()
        .fold(Self::new(), |intel, (ip, threat, confidence)| {
            intel.with(IpAddr::V4(ip), threat, confidence)
        })
    }

    pub fn lookup(&self, ip: &IpAddr) -> Option<&ThreatIndicator> {
        self.indicators.get(ip)
    }
}

#[derive(Debug, Deserialize)]
pub struct ReputationArgs {
    pub ip_address: String,
}

pub struct CheckIpReputation {
    intel: Arc<ThreatIntel>,
}

impl CheckIpReputation {
    pub fn new(intel: Arc<ThreatIntel>) -> Self {
        Self { intel }
    }
}

#[async_trait]
impl Tool for CheckIpReputation {
    type Args = ReputationArgs;

    fn name(&self) -> &str {
        "check_ip_reputation"
    }

    fn description(&self) -> &str {
        "Check if an IP address is known to be malicious based on threat intelligence feeds. \
         This tool should be called for ANY external IP addresses found in alerts. Returns \
         whether the IP is known-bad, the threat category, and a confidence score (0-100)."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::required("ip_address", FieldKind::String)
                .describe("The IPv4 address to check (e.g., '185.220.101.45')"),
        )
    }

    async fn call(&self, args: ReputationArgs) -> Result<Value, HandlerError> {
        let raw = args.ip_address.trim();
        let ip: IpAddr = raw
            .parse()
            .map_err(|_| HandlerError::new(format!("'{raw}' is not a valid IP address")))?;
        let checked_at = Utc::now().to_rfc3339();

        Ok(match self.intel.lookup(&ip) {
            Some(hit) => json!({
                "ip": raw,
                "is_malicious": true,
                "threat_type": hit.threat,
                "confidence_score": hit.confidence,
                "recommendation": "BLOCK - High confidence threat indicator",
                "checked_at": checked_at,
            }),
            None => json!({
                "ip": raw,
                "is_malicious": false,
                "threat_type": "None detected",
                "confidence_score": 0,
                "recommendation": "MONITOR - No known threat indicators",
                "checked_at": checked_at,
            }),
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> CheckIpReputation {
        CheckIpReputation::new(Arc::new(ThreatIntel::builtin()))
    }

    #[tokio::test]
    async fn test_known_bad_ip() {
        let out = tool()
            .call(ReputationArgs {
                ip_address: "185.220.101.45".into(),
            })
            .await
            .unwrap();
        assert_eq!(out["is_malicious"], true);
        assert_eq!(out["threat_type"], "Tor Exit Node");
        assert_eq!(out["confidence_score"], 90);
        assert!(out["recommendation"].as_str().unwrap().starts_with("BLOCK"));
    }

    #[tokio::test]
    async fn test_clean_ip() {
        let out = tool()
            .call(ReputationArgs {
                ip_address: "8.8.8.8".into(),
            })
            .await
            .unwrap();
        assert_eq!(out["is_malicious"], false);
        assert_eq!(out["confidence_score"], 0);
        assert!(out["recommendation"].as_str().unwrap().starts_with("MONITOR"));
    }

    #[tokio::test]
    async fn test_garbage_address_is_handler_error() {
        let err = tool()
            .call(ReputationArgs {
                ip_address: "not-an-ip".into(),
            })
            .await
            .unwrap_err();
        assert!(err.message.contains("not-an-ip"));
    }

    #[test]
    fn test_custom_feed() {
        let ip: IpAddr = "203.0.113.7".parse().unwrap();
        let intel = ThreatIntel::new().with(ip, "Botnet", 150);
        assert_eq!(intel.lookup(&ip).unwrap().confidence, 100);
    }
}
