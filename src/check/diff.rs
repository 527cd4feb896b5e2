//! Port-usage diff: the same answers viewed as `(protocol, port)` usage.
//!
//! Paths within a mechanism are compared on the full set of `host:port (SSL)`
//! entries per protocol-port; mechanisms are compared on host and coalesced
//! SSL mode for every protocol-port they share.

use std::collections::{BTreeMap, BTreeSet};

use super::normalize::{normalize_autoconfig, normalize_autodiscover};
use super::{is_autodiscover_payload, is_autoconfig_payload};
use crate::models::{
    DomainCheckDifResult, DomainResult, PathPortUsage, PortUsageDetail, QueryAttempt, SrvPortUsage,
    SrvRecord, SrvRecordSets, SrvResult,
};
use crate::xml::Element;

const NOT_AVAILABLE: &str = "N/A";

/// Port usage of an Autodiscover payload.
///
/// Empty unless the payload is an `email`/`settings` answer. Protocols
/// without a type or port are not reported.
pub fn autodiscover_ports(config: &str) -> Vec<PortUsageDetail> {
    let Ok(root) = Element::parse(config) else {
        return Vec::new();
    };
    let Some(account) = Some(&root)
        .filter(|r| r.name == "Autodiscover")
        .and_then(|r| r.child("Response"))
        .and_then(|r| r.child("Account"))
        .filter(|a| a.child_text("AccountType") == Some("email"))
        .filter(|a| a.child_text("Action") == Some("settings"))
    else {
        return Vec::new();
    };

    account
        .children_named("Protocol")
        .filter_map(|protocol| {
            let text = |name: &str| protocol.child_text(name).unwrap_or_default().to_string();
            let (ssl, status) = if let Some(enc) = protocol.child("Encryption") {
                let standard = matches!(enc.text.as_str(), "NONE" | "SSL" | "TLS" | "Auto");
                (enc.text.clone(), standard)
            } else if let Some(ssl) = protocol.child("SSL") {
                (ssl.text.clone(), matches!(ssl.text.as_str(), "on" | "off"))
            } else {
                (NOT_AVAILABLE.to_string(), false)
            };
            let detail = PortUsageDetail {
                protocol: text("Type"),
                port: text("Port"),
                status: standard_label(status).to_string(),
                host: text("Server"),
                ssl,
            };
            (!detail.protocol.is_empty() && !detail.port.is_empty()).then_some(detail)
        })
        .collect()
}

/// Port usage of an Autoconfig payload, incoming servers first.
pub fn autoconfig_ports(config: &str) -> Vec<PortUsageDetail> {
    let Ok(root) = Element::parse(config) else {
        return Vec::new();
    };
    let Some(provider) = Some(&root)
        .filter(|r| r.name == "clientConfig")
        .and_then(|r| r.child("emailProvider"))
    else {
        return Vec::new();
    };

    provider
        .children_named("incomingServer")
        .chain(provider.children_named("outgoingServer"))
        .filter_map(|server| {
            let ssl = server
                .child_text("socketType")
                .unwrap_or(NOT_AVAILABLE)
                .to_string();
            let standard = matches!(ssl.as_str(), "SSL" | "PLAIN" | "STARTTLS");
            let detail = PortUsageDetail {
                protocol: server.attr("type").unwrap_or_default().to_uppercase(),
                port: server.child_text("port").unwrap_or_default().to_string(),
                status: standard_label(standard).to_string(),
                host: server.child_text("hostname").unwrap_or_default().to_string(),
                ssl,
            };
            (!detail.protocol.is_empty() && !detail.port.is_empty()).then_some(detail)
        })
        .collect()
}

fn standard_label(standard: bool) -> &'static str {
    if standard {
        "standard"
    } else {
        "nonstandard"
    }
}

/// Port usage of SRV answers, receive records first.
pub fn srv_ports(srv: &SrvResult) -> Vec<PortUsageDetail> {
    srv.recv_records
        .iter()
        .chain(&srv.send_records)
        .map(|record| PortUsageDetail {
            protocol: srv_protocol(&record.service).to_string(),
            port: record.port.to_string(),
            status: srv_port_status(record).to_string(),
            host: record.target.trim_end_matches('.').to_string(),
            ssl: srv_ssl(&record.service).to_string(),
        })
        .collect()
}

fn srv_protocol(service: &str) -> &'static str {
    if service.starts_with("_submission") {
        "SMTP"
    } else if service.starts_with("_imap") {
        "IMAP"
    } else if service.starts_with("_pop3") {
        "POP3"
    } else {
        "OTHER"
    }
}

fn srv_ssl(service: &str) -> &'static str {
    if ["_submissions", "_imaps", "_pop3s"].iter().any(|p| service.starts_with(p)) {
        "on"
    } else if ["_submission", "_imap", "_pop3"].iter().any(|p| service.starts_with(p)) {
        "off"
    } else {
        "UNKNOWN"
    }
}

/// `secure`, `insecure` or `nonstandard` for a record's service and port.
///
/// Unknown services get an empty status.
fn srv_port_status(record: &SrvRecord) -> &'static str {
    let prefix = record.service.split('.').next().unwrap_or_default();
    let (secure, expected): (bool, &[u16]) = match prefix {
        "_submissions" => (true, &[465]),
        "_submission" => (false, &[25, 587]),
        "_imaps" => (true, &[993]),
        "_imap" => (false, &[143]),
        "_pop3s" => (true, &[995]),
        "_pop3" => (false, &[110]),
        _ => return "",
    };
    match (expected.contains(&record.port), secure) {
        (true, true) => "secure",
        (true, false) => "insecure",
        (false, _) => "nonstandard",
    }
}

/// True when the paths of one mechanism disagree on any protocol-port.
///
/// A path lacking a protocol-port that another path reports counts as a
/// disagreement.
pub fn internal_diff(paths: &[PathPortUsage]) -> bool {
    let mut groups: BTreeMap<String, Vec<BTreeSet<String>>> = BTreeMap::new();
    for (idx, path) in paths.iter().enumerate() {
        for p in &path.ports_usage {
            let key = format!("{}-{}", p.protocol.to_uppercase(), p.port);
            let entry = format!("{}:{} ({})", p.host, p.port, p.ssl.to_uppercase());
            groups
                .entry(key)
                .or_insert_with(|| vec![BTreeSet::new(); paths.len()])[idx]
                .insert(entry);
        }
    }
    // Missing paths hold an empty set, which differs from any reported one
    groups
        .values()
        .any(|sets| sets.iter().collect::<BTreeSet<_>>().len() > 1)
}

fn coalesce_ssl(ssl: &str) -> String {
    let upper = ssl.to_uppercase();
    match upper.as_str() {
        "ON" | "SSL" | "TLS" => "SSL".to_string(),
        "OFF" | "PLAIN" => "PLAIN".to_string(),
        _ => upper,
    }
}

/// SRV service to (protocol, SSL mode) as compared across mechanisms.
fn srv_mechanism_view(service: &str) -> (&'static str, &'static str) {
    const TABLE: [(&str, &str, &str); 5] = [
        ("_imaps", "IMAP", "SSL"),
        ("_imap", "IMAP", "STARTTLS"),
        ("_pop3s", "POP3", "SSL"),
        ("_pop3", "POP3", "STARTTLS"),
        ("_submission", "SMTP", "STARTTLS"),
    ];
    TABLE
        .iter()
        .find(|(needle, _, _)| service.contains(needle))
        .map(|(_, proto, ssl)| (*proto, *ssl))
        .unwrap_or(("", ""))
}

/// True when two mechanisms report different hosts or SSL modes for a shared
/// protocol-port.
pub fn mechanism_diff(
    autodiscover: &[PathPortUsage],
    autoconfig: &[PathPortUsage],
    srv: Option<&SrvPortUsage>,
) -> bool {
    // protocol-port -> mechanism -> (host, ssl); the last record per mechanism wins
    let mut by_key: BTreeMap<String, BTreeMap<&str, (String, String)>> = BTreeMap::new();
    let mut record = |mechanism: &'static str, protocol: &str, port: &str, host: &str, ssl: String| {
        by_key
            .entry(format!("{protocol}-{port}"))
            .or_default()
            .insert(mechanism, (host.to_string(), ssl));
    };

    for (mechanism, paths) in [("autodiscover", autodiscover), ("autoconfig", autoconfig)] {
        for p in paths.iter().flat_map(|path| &path.ports_usage) {
            record(mechanism, &p.protocol.to_uppercase(), &p.port, &p.host, coalesce_ssl(&p.ssl));
        }
    }
    if let Some(srv) = srv {
        for r in srv.srv_records.recv.iter().chain(&srv.srv_records.send) {
            let (protocol, ssl) = srv_mechanism_view(&r.service);
            record(
                "srv",
                protocol,
                &r.port.to_string(),
                r.target.trim_end_matches('.'),
                ssl.to_string(),
            );
        }
    }

    by_key.values().any(|mechanisms| {
        let hosts: BTreeSet<&str> = mechanisms.values().map(|(h, _)| h.as_str()).collect();
        let modes: BTreeSet<&str> = mechanisms.values().map(|(_, s)| s.as_str()).collect();
        hosts.len() > 1 || modes.len() > 1
    })
}

fn path_usage(attempt: &QueryAttempt, ports_usage: Vec<PortUsageDetail>) -> PathPortUsage {
    PathPortUsage {
        index: attempt.index,
        uri: attempt.uri.clone(),
        method: attempt.method.clone(),
        config: attempt.config.clone(),
        ports_usage,
        redirects: attempt.redirects.clone(),
        cert_info: attempt.cert_info.clone(),
    }
}

/// Runs the port-usage diff for one scanned domain.
///
/// Returns `None` when no mechanism produced anything to normalize.
pub fn diff_domain(result: &DomainResult) -> Option<DomainCheckDifResult> {
    let mut normalized = 0usize;

    let autodiscover: Vec<PathPortUsage> = result
        .autodiscover
        .iter()
        .filter(|a| is_autodiscover_payload(&a.config))
        .map(|a| {
            normalized += usize::from(normalize_autodiscover(&a.config).is_some());
            path_usage(a, autodiscover_ports(&a.config))
        })
        .collect();

    let autoconfig: Vec<PathPortUsage> = result
        .autoconfig
        .iter()
        .filter(|a| is_autoconfig_payload(&a.config))
        .map(|a| {
            normalized += usize::from(normalize_autoconfig(&a.config).is_some());
            path_usage(a, autoconfig_ports(&a.config))
        })
        .collect();

    let srv = result.srv.has_records().then(|| SrvPortUsage {
        srv_records: SrvRecordSets {
            recv: result.srv.recv_records.clone(),
            send: result.srv.send_records.clone(),
        },
        dns_record: result.srv.dns_record.clone(),
        ports_usage: srv_ports(&result.srv),
    });

    if normalized == 0 && srv.is_none() {
        return None;
    }

    let autodiscover_inconsistent = internal_diff(&autodiscover);
    let autoconfig_inconsistent = internal_diff(&autoconfig);
    let across_mechanisms = mechanism_diff(&autodiscover, &autoconfig, srv.as_ref());

    Some(DomainCheckDifResult {
        domain: result.domain.clone(),
        autodiscover_check_result: autodiscover,
        autoconfig_check_result: autoconfig,
        srv_check_result: srv,
        autodiscover_inconsistent,
        autoconfig_inconsistent,
        mechanism_diff: across_mechanisms,
        inconsistent: autodiscover_inconsistent || autoconfig_inconsistent || across_mechanisms,
    })
}
