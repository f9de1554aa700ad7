//! SOC investigation tools.
//!
//! Every tool is a read-only query against a data source injected at
//! construction, so concurrent calls share nothing mutable.

pub mod alerts;
pub mod geolocation;
pub mod reputation;

use std::sync::Arc;

pub use alerts::{Alert, AlertDetails, AlertStore, RecentAlerts, Severity};
pub use geolocation::{GeoLocator, IpApiLocator, LookupIpGeolocation};
pub use reputation::{CheckIpReputation, ThreatIntel};

use super::registry::{RegistryError, ToolRegistry};

/// Data sources backing the SOC tools.
pub struct SocSources {
    pub alerts: Arc<AlertStore>,
    pub intel: Arc<ThreatIntel>,
    pub locator: Arc<dyn GeoLocator>,
}

/// Build the registry of all four SOC tools.
pub fn soc_registry(sources: SocSources) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(RecentAlerts::new(Arc::clone(&sources.alerts)))?;
    registry.register(LookupIpGeolocation::new(sources.locator))?;
    registry.register(CheckIpReputation::new(sources.intel))?;
    registry.register(AlertDetails::new(sources.alerts))?;
    Ok(registry)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::NoNetworkLocator;
    use serde_json::json;

    #[tokio::test]
    async fn test_soc_registry_publishes_all_tools() {
        let registry = soc_registry(SocSources {
            alerts: Arc::new(AlertStore::builtin()),
            intel: Arc::new(ThreatIntel::builtin()),
            locator: Arc::new(NoNetworkLocator),
        })
        .unwrap();

        let names: Vec<String> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "get_recent_alerts",
                "lookup_ip_geolocation",
                "check_ip_reputation",
                "get_alert_details"
            ]
        );

        let out = registry
            .call("get_recent_alerts", json!({"limit": 3}))
            .await
            .unwrap();
        assert_eq!(out["alert_count"], 3);

        let err = registry
            .call("get_recent_alerts", json!({"limit": "3"}))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::protocol::ErrorKind::InvalidArguments);
    }
}
