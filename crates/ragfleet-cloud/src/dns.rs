//! Optional A-record configuration

use crate::error::Result;
use crate::provider::{DnsApi, HostedZone};

pub const DEFAULT_TTL: u32 = 300;
const MIN_TTL: u32 = 60;
const MAX_TTL: u32 = 86_400;

/// Result of the DNS phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsOutcome {
    /// No domain configured
    Skipped,
    Upserted { zone_id: String, record: String },
    /// No matching zone; the record has to be created by hand
    ManualRequired { domain: String },
}

pub fn clamp_ttl(ttl: u32) -> u32 {
    ttl.clamp(MIN_TTL, MAX_TTL)
}

/// Zone whose apex is the longest suffix of `domain`
///
/// Matching is on whole labels: `example.com` matches `api.example.com` but
/// not `badexample.com`.
pub fn best_zone_match<'z>(zones: &'z [HostedZone], domain: &str) -> Option<&'z HostedZone> {
    let domain = normalize(domain);
    zones
        .iter()
        .filter(|zone| {
            let apex = normalize(&zone.name);
            domain == apex || domain.ends_with(&format!(".{}", apex))
        })
        .max_by_key(|zone| normalize(&zone.name).len())
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

pub struct DnsConfigurator<'a> {
    api: &'a dyn DnsApi,
    ttl: u32,
}

impl<'a> DnsConfigurator<'a> {
    pub fn new(api: &'a dyn DnsApi) -> Self {
        Self {
            api,
            ttl: DEFAULT_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: u32) -> Self {
        self.ttl = clamp_ttl(ttl);
        self
    }

    /// Point `domain` at `address`; never creates a zone
    pub async fn configure(&self, domain: Option<&str>, address: &str) -> Result<DnsOutcome> {
        let Some(domain) = domain else {
            tracing::debug!("No domain configured, skipping DNS");
            return Ok(DnsOutcome::Skipped);
        };

        let zones = self.api.list_zones().await?;
        let Some(zone) = best_zone_match(&zones, domain) else {
            tracing::warn!(domain = %domain, "No hosted zone matches; configure DNS manually");
            return Ok(DnsOutcome::ManualRequired {
                domain: domain.to_string(),
            });
        };

        let record = normalize(domain);
        tracing::info!(zone = %zone.name, record = %record, address = %address, "Upserting A record");
        self.api
            .upsert_a_record(zone, &record, address, self.ttl)
            .await?;

        Ok(DnsOutcome::Upserted {
            zone_id: zone.id.clone(),
            record,
        })
    }
}
