//! Vendor schema to `ProtocolInfo` normalization with per-entry verdicts.

use crate::models::{MethodConfig, ProtocolInfo, SrvResult};
use crate::xml::Element;

pub(crate) const VALID: &str = "Valid";
const INVALID: &str = "Invalid";
const DEFAULT_ON: &str = "default(on)";

fn structural_failure(method: &str, reason: &str) -> MethodConfig {
    MethodConfig {
        method: method.to_string(),
        protocols: Vec::new(),
        overall_check: format!("{INVALID}, {reason}"),
    }
}

fn parse(config: &str, method: &str) -> Option<Element> {
    match Element::parse(config) {
        Ok(root) => Some(root),
        Err(e) => {
            log::debug!("Skipping unparsable {method} payload: {e}");
            None
        }
    }
}

fn is_mail_type(t: &str) -> bool {
    matches!(t, "IMAP" | "SMTP" | "POP3")
}

/// Normalizes an Autodiscover `settings` payload.
///
/// Returns `None` when the payload is not well-formed XML. Structural
/// failures produce a config without protocols whose `OverallCheck` names the
/// missing piece. Otherwise the config is invalid as soon as one protocol
/// entry is.
pub fn normalize_autodiscover(config: &str) -> Option<MethodConfig> {
    const METHOD: &str = "Autodiscover";
    let root = parse(config, METHOD)?;

    if root.name != "Autodiscover" {
        return Some(structural_failure(METHOD, "root element <Autodiscover> lost"));
    }
    let Some(response) = root.child("Response") else {
        return Some(structural_failure(METHOD, "<Response> element lost"));
    };
    let Some(account) = response.child("Account") else {
        return Some(structural_failure(METHOD, "missing <Account> element"));
    };
    if account.child_text("AccountType") != Some("email") {
        return Some(structural_failure(METHOD, "<AccountType> must be 'email'"));
    }
    if account.child_text("Action") != Some("settings") {
        return Some(structural_failure(METHOD, "<Action> must be 'settings'"));
    }

    let protocols: Vec<ProtocolInfo> = account
        .children_named("Protocol")
        .map(autodiscover_protocol)
        .collect();
    let overall_check = if protocols.iter().all(|p| p.single_check == VALID) {
        VALID
    } else {
        INVALID
    };

    Some(MethodConfig {
        method: METHOD.to_string(),
        protocols,
        overall_check: overall_check.to_string(),
    })
}

fn autodiscover_protocol(element: &Element) -> ProtocolInfo {
    let text = |name: &str| element.child_text(name).unwrap_or_default().to_string();
    let mut p = ProtocolInfo {
        protocol_type: text("Type"),
        server: text("Server"),
        port: text("Port"),
        domain_required: text("DomainRequired"),
        spa: text("SPA"),
        ssl: text("SSL"),
        auth_required: text("AuthRequired"),
        encryption: text("Encryption"),
        use_pop_auth: text("UsePOPAuth"),
        smtp_last: text("SMTPLast"),
        ttl: text("TTL"),
        single_check: VALID.to_string(),
        ..Default::default()
    };

    // Later rules overwrite earlier verdicts
    match element.attr("Type") {
        Some(attr) if !p.protocol_type.is_empty() => {
            p.single_check = format!(
                "Invalid, <Type> element mustn't show, Type attribute of <Protocol> is {attr}"
            );
        }
        None if p.protocol_type.is_empty() => {
            p.single_check =
                "Invalid, no Type attribute in <Protocol> element nor <Type> element".to_string();
        }
        _ => {}
    }

    if p.ssl.is_empty() {
        p.ssl = DEFAULT_ON.to_string();
    }
    if !p.encryption.is_empty() {
        if !is_mail_type(&p.protocol_type) {
            p.single_check = "Invalid, supposed no <Encryption>".to_string();
        }
        if !matches!(p.encryption.as_str(), "None" | "SSL" | "TLS" | "Auto") {
            p.single_check = format!(
                "Invalid, Encryption method {}, not supposed to appear",
                p.encryption
            );
        }
        p.ssl.clear();
    }

    if matches!(
        p.protocol_type.as_str(),
        "EXCH" | "EXPR" | "EXHTTP" | "POP3" | "SMTP" | "IMAP"
    ) && p.server.is_empty()
    {
        p.single_check = "Invalid, no valid Server".to_string();
    }
    if !p.smtp_last.is_empty() && p.protocol_type != "SMTP" {
        p.smtp_last.clear();
        p.single_check = "Invalid, SMTPLast not supposed".to_string();
    }
    if p.spa.is_empty() && is_mail_type(&p.protocol_type) {
        p.spa = DEFAULT_ON.to_string();
    }
    if !p.spa.is_empty() && !is_mail_type(&p.protocol_type) {
        p.spa.clear();
        p.single_check = "Invalid, SPA not supposed".to_string();
    }
    if !p.use_pop_auth.is_empty() && p.protocol_type != "SMTP" {
        p.use_pop_auth.clear();
        p.single_check = "Invalid, UsePOPAuth not supposed".to_string();
    }
    p
}

#[derive(Clone, Copy)]
enum Direction {
    Incoming,
    Outgoing,
}

/// Normalizes an Autoconfig `clientConfig` payload.
///
/// Returns `None` when the payload is not well-formed XML. The config is
/// valid when at least one incoming and at least one outgoing server entry is
/// individually valid.
pub fn normalize_autoconfig(config: &str) -> Option<MethodConfig> {
    const METHOD: &str = "Autoconfig";
    let root = parse(config, METHOD)?;

    if root.name != "clientConfig" {
        return Some(structural_failure(METHOD, "root element <clientConfig> lost"));
    }
    let Some(provider) = root.child("emailProvider") else {
        return Some(structural_failure(METHOD, "<emailProvider> element lost"));
    };

    let incoming: Vec<ProtocolInfo> = provider
        .children_named("incomingServer")
        .map(|e| autoconfig_server(e, Direction::Incoming))
        .collect();
    let outgoing: Vec<ProtocolInfo> = provider
        .children_named("outgoingServer")
        .map(|e| autoconfig_server(e, Direction::Outgoing))
        .collect();

    let any_valid = |list: &[ProtocolInfo]| list.iter().any(|p| p.single_check == VALID);
    let overall_check = if any_valid(&incoming) && any_valid(&outgoing) {
        VALID
    } else {
        INVALID
    };

    let mut protocols = incoming;
    protocols.extend(outgoing);
    Some(MethodConfig {
        method: METHOD.to_string(),
        protocols,
        overall_check: overall_check.to_string(),
    })
}

fn autoconfig_server(element: &Element, direction: Direction) -> ProtocolInfo {
    let mut p = ProtocolInfo {
        protocol_type: element.attr("type").unwrap_or_default().to_string(),
        server: element.child_text("hostname").unwrap_or_default().to_string(),
        port: element.child_text("port").unwrap_or_default().to_string(),
        ssl: element.child_text("socketType").unwrap_or_default().to_string(),
        single_check: VALID.to_string(),
        ..Default::default()
    };

    let methods: Vec<&str> = element
        .children_named("authentication")
        .map(|a| a.text.as_str())
        .collect();
    let only = |m: &str| methods.len() == 1 && methods[0] == m;
    if only("OAuth2") {
        p.single_check = "Invalid, OAuth2 must have fallback authmethod".to_string();
    }
    if !methods.is_empty() {
        p.encryption = methods.join(", ");
    }

    let port = p.port.as_str();
    let verdict = match (direction, p.protocol_type.as_str()) {
        (Direction::Incoming, "imap") => {
            socket_rule(&p.ssl, port, ("993", "IMAP-SSL-993"), (&["143"], "IMAP-STARTTLS-143"))
        }
        (Direction::Incoming, "pop3") => {
            socket_rule(&p.ssl, port, ("995", "POP3-SSL-995"), (&["110"], "POP3-STARTTLS-110"))
        }
        (Direction::Incoming, _) => Some("Invalid, Type supposed to be imap or pop3".to_string()),
        (Direction::Outgoing, "smtp") => socket_rule(
            &p.ssl,
            port,
            ("465", "SMTP-SSL-465"),
            (&["25", "2525", "587"], "SMTP-STARTTLS-587"),
        ),
        (Direction::Outgoing, _) => Some("Invalid, Type supposed to be smtp".to_string()),
    };
    let verdict = verdict.or_else(|| {
        (p.ssl == "plain" && only("password-cleartext"))
            .then(|| "Invalid, only plain method is not supposed".to_string())
    });
    if let Some(verdict) = verdict {
        p.single_check = verdict;
    }
    p
}

/// Port rule for one socket type; `None` means the combination is acceptable.
///
/// The `plain` cleartext-only rule is applied by the caller.
fn socket_rule(
    socket: &str,
    port: &str,
    (ssl_port, ssl_label): (&str, &str),
    (starttls_ports, starttls_label): (&[&str], &str),
) -> Option<String> {
    match socket {
        "SSL" | "TLS" if port != ssl_port => Some(format!("Invalid, supposed {ssl_label}")),
        "STARTTLS" if !starttls_ports.contains(&port) => {
            Some(format!("Invalid, supposed {starttls_label}"))
        }
        "SSL" | "TLS" | "STARTTLS" | "plain" => None,
        other => Some(format!("Invalid, socketType {other} not supposed")),
    }
}

/// Protocol label for an SRV service name such as `_imaps._tcp.example.com`.
pub fn service_type(service: &str) -> &'static str {
    // Longer prefixes first: `_imap` is a prefix of `_imaps`
    const TABLE: [(&str, &str); 6] = [
        ("_imaps", "IMAPS"),
        ("_imap", "IMAP"),
        ("_pop3s", "POP3S"),
        ("_pop3", "POP3"),
        ("_submissions", "SMTPS"),
        ("_submission", "SMTP"),
    ];
    TABLE
        .iter()
        .find(|(prefix, _)| service.starts_with(prefix))
        .map(|(_, label)| *label)
        .unwrap_or("Unknown")
}

/// Normalizes SRV answers; valid when any record matches its expected port.
pub fn normalize_srv(srv: &SrvResult) -> MethodConfig {
    let recv = srv.recv_records.iter().map(|r| (r, recv_verdict(service_type(&r.service), r.port)));
    let send = srv.send_records.iter().map(|r| (r, send_verdict(service_type(&r.service), r.port)));

    let protocols: Vec<ProtocolInfo> = recv
        .chain(send)
        .map(|(record, verdict)| ProtocolInfo {
            protocol_type: service_type(&record.service).to_string(),
            server: record.target.clone(),
            port: record.port.to_string(),
            priority: record.priority.to_string(),
            weight: record.weight.to_string(),
            single_check: verdict.unwrap_or_else(|| VALID.to_string()),
            ..Default::default()
        })
        .collect();

    let overall_check = if protocols.iter().any(|p| p.single_check == VALID) {
        VALID
    } else {
        INVALID
    };
    MethodConfig {
        method: "SRV".to_string(),
        protocols,
        overall_check: overall_check.to_string(),
    }
}

fn recv_verdict(kind: &str, port: u16) -> Option<String> {
    let reason = match (kind, port) {
        ("IMAPS", p) if p != 993 => "supposed imaps-993",
        ("IMAP", p) if p != 143 => "supposed imap-143",
        ("POP3S", p) if p != 995 => "supposed pop3s-995",
        ("POP3", p) if p != 110 => "supposed pop3-110",
        ("Unknown", _) => "unknown protocol type",
        _ => return None,
    };
    Some(format!("{INVALID}, {reason}"))
}

fn send_verdict(kind: &str, port: u16) -> Option<String> {
    let reason = match (kind, port) {
        ("SMTPS", p) if p != 465 => "supposed smtps-465",
        ("SMTP", 25) => "cleartext SMTP not supposed",
        ("SMTP", p) if p != 587 => "supposed smtp-587",
        ("Unknown", _) => "unknown protocol type",
        _ => return None,
    };
    Some(format!("{INVALID}, {reason}"))
}
