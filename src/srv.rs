//! SRV discovery for the six mail services.
//!
//! Receiving services (`_imap`, `_imaps`, `_pop3`, `_pop3s`) and sending
//! services (`_submission`, `_submissions`) are queried with DNSSEC-OK set.
//! Records with a `"."` target advertise that the service is not offered and
//! are dropped; the rest are kept in SRV selection order.

use std::sync::Arc;

use crate::dns::{sort_srv_records, Authority, DnsClient};
use crate::models::{DnsRecord, SrvRecord, SrvResult};

/// Service labels for incoming mail, in query order.
pub const RECV_SERVICES: [&str; 4] = ["_imap", "_imaps", "_pop3", "_pop3s"];
/// Service labels for mail submission, in query order.
pub const SEND_SERVICES: [&str; 2] = ["_submission", "_submissions"];

/// Runs the SRV lookups for a domain.
#[derive(Debug, Clone)]
pub struct SrvResolver {
    dns: Arc<DnsClient>,
}

/// Stores the AD bit of `label` on the matching `DnsRecord` field.
fn set_ad_bit(record: &mut DnsRecord, label: &str, authentic_data: bool) {
    let slot = match label {
        "_imap" => &mut record.adbit_imap,
        "_imaps" => &mut record.adbit_imaps,
        "_pop3" => &mut record.adbit_pop3,
        "_pop3s" => &mut record.adbit_pop3s,
        "_submission" => &mut record.adbit_smtp,
        "_submissions" => &mut record.adbit_smtps,
        _ => return,
    };
    *slot = Some(authentic_data);
}

impl SrvResolver {
    /// Creates a resolver over `dns`.
    pub fn new(dns: Arc<DnsClient>) -> Self {
        Self { dns }
    }

    /// Queries authority and all six services for `domain`.
    ///
    /// Lookup failures are logged and skipped; the result always carries a
    /// `dns_record`, with empty authority when neither SOA nor NS resolved.
    pub async fn query(&self, domain: &str) -> SrvResult {
        let mut dns_record = DnsRecord {
            domain: domain.to_string(),
            ..Default::default()
        };
        match self.dns.lookup_authority(domain).await {
            Ok(Authority::Soa(mname)) => dns_record.soa = Some(mname),
            Ok(Authority::Ns(servers)) => dns_record.ns = Some(servers),
            Err(e) => log::debug!("Failed to query DNS manager for {domain}: {e}"),
        }

        let mut recv_records = self
            .collect(domain, &RECV_SERVICES, &mut dns_record)
            .await;
        let mut send_records = self
            .collect(domain, &SEND_SERVICES, &mut dns_record)
            .await;
        sort_srv_records(&mut recv_records);
        sort_srv_records(&mut send_records);

        SrvResult {
            domain: domain.to_string(),
            recv_records,
            send_records,
            dns_record: Some(dns_record),
        }
    }

    async fn collect(
        &self,
        domain: &str,
        labels: &[&str],
        dns_record: &mut DnsRecord,
    ) -> Vec<SrvRecord> {
        let mut records = Vec::new();
        for label in labels {
            let service = format!("{label}._tcp.{domain}");
            let answer = match self.dns.lookup_srv(&service).await {
                Ok(answer) if !answer.records.is_empty() => answer,
                Ok(_) => {
                    log::debug!("No SRV records for {service}");
                    continue;
                }
                Err(e) => {
                    log::debug!("Failed to query SRV for {service}: {e}");
                    continue;
                }
            };
            set_ad_bit(dns_record, label, answer.authentic_data);
            records.extend(answer.records.into_iter().filter(|r| r.target != "."));
        }
        records
    }
}
