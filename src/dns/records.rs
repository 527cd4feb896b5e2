//! Record lookups used by the discovery mechanisms.
//!
//! This module provides:
//! - SRV queries with the DNSSEC authenticated-data flag
//! - Zone authority (SOA, falling back to NS)
//! - CNAME chains (retried on transport failure)
//! - Highest-priority MX host
//! - The `_autodiscover._tcp` SRV endpoint

use hickory_proto::rr::{RData, RecordType};
use tokio_retry::RetryIf;

use super::client::{ensure_success, DnsClient};
use crate::config::{DNS_SHORT_TIMEOUT_SECS, DNS_TIMEOUT_SECS};
use crate::error_handling::{get_retry_strategy, DnsError};
use crate::models::SrvRecord;

/// SRV answer for one service name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SrvAnswer {
    /// Records in answer order, including `"."` targets
    pub records: Vec<SrvRecord>,
    /// DNSSEC authenticated-data flag of the response
    pub authentic_data: bool,
}

/// Party responsible for a zone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authority {
    /// Primary name server from the SOA record
    Soa(String),
    /// Comma-joined NS targets, used when there is no SOA answer
    Ns(String),
}

impl DnsClient {
    /// Queries SRV records for a full service name such as `_imaps._tcp.example.com`.
    pub async fn lookup_srv(&self, service: &str) -> Result<SrvAnswer, DnsError> {
        self.lookup_srv_with_timeout(service, DNS_TIMEOUT_SECS).await
    }

    async fn lookup_srv_with_timeout(
        &self,
        service: &str,
        timeout_secs: u64,
    ) -> Result<SrvAnswer, DnsError> {
        let response = self
            .query(service, RecordType::SRV, true, timeout_secs)
            .await?;
        let records = response
            .answers()
            .iter()
            .filter_map(|record| match record.data() {
                Some(RData::SRV(srv)) => Some(SrvRecord {
                    service: service.to_string(),
                    priority: srv.priority(),
                    weight: srv.weight(),
                    port: srv.port(),
                    target: srv.target().to_utf8(),
                }),
                _ => None,
            })
            .collect();
        Ok(SrvAnswer {
            records,
            authentic_data: response.authentic_data(),
        })
    }

    /// Finds who manages `domain`: the SOA primary name server, else the NS set.
    pub async fn lookup_authority(&self, domain: &str) -> Result<Authority, DnsError> {
        let soa = self
            .query(domain, RecordType::SOA, false, DNS_TIMEOUT_SECS)
            .await?;
        if let Some(mname) = soa.answers().iter().find_map(|r| match r.data() {
            Some(RData::SOA(soa)) => Some(soa.mname().to_utf8()),
            _ => None,
        }) {
            return Ok(Authority::Soa(mname));
        }

        let ns = self
            .query(domain, RecordType::NS, false, DNS_TIMEOUT_SECS)
            .await?;
        let servers: Vec<String> = ns
            .answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::NS(ns)) => Some(ns.0.to_utf8()),
                _ => None,
            })
            .collect();
        if servers.is_empty() {
            return Err(DnsError::NoRecords(format!(
                "no SOA or NS records found for domain: {domain}"
            )));
        }
        Ok(Authority::Ns(servers.join(", ")))
    }

    /// Returns the CNAME targets seen when resolving `domain`.
    ///
    /// An answer without CNAME records is not an error. Transport failures are
    /// retried with linearly growing delays.
    pub async fn lookup_cname(&self, domain: &str) -> Result<Vec<String>, DnsError> {
        let response = RetryIf::spawn(
            get_retry_strategy(),
            || self.query(domain, RecordType::A, false, DNS_SHORT_TIMEOUT_SECS),
            |e: &DnsError| {
                log::debug!("CNAME lookup for {domain} failed, retrying: {e}");
                e.is_transient()
            },
        )
        .await?;

        Ok(response
            .answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::CNAME(cname)) => Some(cname.0.to_utf8()),
                _ => None,
            })
            .collect())
    }

    /// Returns the exchange host of the most preferred MX record.
    pub async fn resolve_mx(&self, domain: &str) -> Result<String, DnsError> {
        let response = self
            .query(domain, RecordType::MX, false, DNS_TIMEOUT_SECS)
            .await?;
        ensure_success(&response)?;

        response
            .answers()
            .iter()
            .filter_map(|r| match r.data() {
                Some(RData::MX(mx)) => Some((mx.preference(), mx.exchange().to_utf8())),
                _ => None,
            })
            .min_by_key(|(preference, _)| *preference)
            .map(|(_, host)| host)
            .ok_or_else(|| DnsError::NoRecords("no MX Record".to_string()))
    }

    /// Builds the Autodiscover endpoint advertised by `_autodiscover._tcp.<domain>`.
    ///
    /// Returns the URI and the AD flag of the answer.
    pub async fn lookup_autodiscover_srv(&self, domain: &str) -> Result<(String, bool), DnsError> {
        let service = format!("_autodiscover._tcp.{domain}");
        let mut answer = self
            .lookup_srv_with_timeout(&service, DNS_SHORT_TIMEOUT_SECS)
            .await?;
        sort_srv_records(&mut answer.records);

        let best = answer
            .records
            .first()
            .ok_or_else(|| DnsError::NoRecords("no srvRecord found".to_string()))?;
        if best.target == "." {
            return Err(DnsError::NoRecords("hostname == '.'".to_string()));
        }

        let host = best.target.trim_end_matches('.');
        let uri = match best.port {
            443 => format!("https://{host}/autodiscover/autodiscover.xml"),
            80 => format!("http://{host}/autodiscover/autodiscover.xml"),
            port => format!("https://{host}:{port}/autodiscover/autodiscover.xml"),
        };
        Ok((uri, answer.authentic_data))
    }
}

/// Sorts into SRV selection order: priority ascending, then weight descending.
pub fn sort_srv_records(records: &mut [SrvRecord]) {
    records.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| b.weight.cmp(&a.weight))
    });
}
