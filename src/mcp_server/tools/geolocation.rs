//! `lookup_ip_geolocation`: where an address lives and who owns it.
//!
//! The lookup backend is a [`GeoLocator`]; the default one queries
//! ip-api.com. Private and otherwise non-routable addresses are answered
//! locally without a network call.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp_server::handler::{HandlerError, Tool};
use crate::protocol::{FieldKind, FieldSpec, InputSchema};

/// Default ip-api.com endpoint (free tier is HTTP only).
pub const DEFAULT_GEO_API_URL: &str = "http://ip-api.com";

const GEO_TIMEOUT: Duration = Duration::from_secs(10);

const UNRESOLVABLE_MESSAGE: &str = "Could not geolocate IP - may be private/reserved range";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoRecord {
    pub country: String,
    pub region: String,
    pub city: String,
    pub isp: String,
    pub organization: String,
    pub asn: String,
}

#[derive(Debug, Error)]
pub enum GeoError {
    /// The backend has no location for this address (reserved ranges etc).
    #[error("address not resolvable: {0}")]
    Unresolvable(String),

    #[error("geolocation request failed: {0}")]
    Request(String),
}

/// Geolocation backend.
#[async_trait]
pub trait GeoLocator: Send + Sync {
    async fn locate(&self, ip: IpAddr) -> Result<GeoRecord, GeoError>;
}

// ─── ip-api.com ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    isp: Option<String>,
    #[serde(default)]
    org: Option<String>,
    #[serde(default, rename = "as")]
    asn: Option<String>,
}

impl IpApiResponse {
    fn into_record(self) -> Result<GeoRecord, GeoError> {
        if self.status != "success" {
            return Err(GeoError::Unresolvable(
                self.message.unwrap_or_else(|| self.status.clone()),
            ));
        }
        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| "Unknown".to_string());
        Ok(GeoRecord {
            country: or_unknown(self.country),
            region: or_unknown(self.region_name),
            city: or_unknown(self.city),
            isp: or_unknown(self.isp),
            organization: or_unknown(self.org),
            asn: or_unknown(self.asn),
        })
    }
}

pub struct IpApiLocator {
    client: reqwest::Client,
    base_url: String,
}

impl IpApiLocator {
    pub fn new(base_url: &str) -> Result<Self, GeoError> {
        let client = reqwest::Client::builder()
            .timeout(GEO_TIMEOUT)
            .build()
            .map_err(|e| GeoError::Request(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl GeoLocator for IpApiLocator {
    async fn locate(&self, ip: IpAddr) -> Result<GeoRecord, GeoError> {
        let url = format!("{}/json/{ip}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "status,message,country,regionName,city,isp,org,as,query")])
            .send()
            .await
            .map_err(|e| GeoError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GeoError::Request(format!("HTTP {}", response.status())));
        }

        let body: IpApiResponse = response
            .json()
            .await
            .map_err(|e| GeoError::Request(format!("bad response body: {e}")))?;
        body.into_record()
    }
}

// ─── Tool ────────────────────────────────────────────────────────────────────

/// Addresses no public geolocation service can place.
pub fn is_non_routable(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00
                || (first & 0xffc0) == 0xfe80
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GeolocationArgs {
    pub ip_address: String,
}

pub struct LookupIpGeolocation {
    locator: Arc<dyn GeoLocator>,
}

impl LookupIpGeolocation {
    pub fn new(locator: Arc<dyn GeoLocator>) -> Self {
        Self { locator }
    }
}

#[async_trait]
impl Tool for LookupIpGeolocation {
    type Args = GeolocationArgs;

    fn name(&self) -> &str {
        "lookup_ip_geolocation"
    }

    fn description(&self) -> &str {
        "Look up geographic and network ownership information for an IP address. This \
         provides context about WHERE an IP is located and WHO owns it. Useful for \
         identifying if traffic is coming from unexpected countries or suspicious hosting \
         providers."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new().field(
            FieldSpec::required("ip_address", FieldKind::String)
                .describe("The IPv4 address to look up (e.g., '185.220.101.45')"),
        )
    }

    async fn call(&self, args: GeolocationArgs) -> Result<Value, HandlerError> {
        let raw = args.ip_address.trim();
        let ip: IpAddr = raw
            .parse()
            .map_err(|_| HandlerError::new(format!("'{raw}' is not a valid IP address")))?;

        let unresolvable = || {
            json!({
                "ip": raw,
                "error": UNRESOLVABLE_MESSAGE,
                "is_private": true,
            })
        };

        if is_non_routable(&ip) {
            return Ok(unresolvable());
        }

        match self.locator.locate(ip).await {
            Ok(geo) => Ok(json!({
                "ip": raw,
                "country": geo.country,
                "region": geo.region,
                "city": geo.city,
                "isp": geo.isp,
                "organization": geo.organization,
                "asn": geo.asn,
                "queried_at": Utc::now().to_rfc3339(),
            })),
            Err(GeoError::Unresolvable(_)) => Ok(unresolvable()),
            Err(e) => Err(HandlerError::new(format!("Geolocation lookup failed: {e}"))),
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
