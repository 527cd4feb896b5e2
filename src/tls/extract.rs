//! Certificate extraction utilities.

use std::net::IpAddr;

use x509_parser::certificate::X509Certificate;
use x509_parser::der_parser::der::parse_der_integer;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::public_key::PublicKey;
use x509_parser::x509::X509Name;

/// OID of the `caIssuers` access method in the Authority Information Access extension.
const OID_CA_ISSUERS: &str = "1.3.6.1.5.5.7.48.2";

/// Signature algorithm OIDs and their display names.
const SIGNATURE_ALGORITHMS: &[(&str, &str)] = &[
    ("1.2.840.113549.1.1.2", "MD2-RSA"),
    ("1.2.840.113549.1.1.4", "MD5-RSA"),
    ("1.2.840.113549.1.1.5", "SHA1-RSA"),
    ("1.2.840.113549.1.1.11", "SHA256-RSA"),
    ("1.2.840.113549.1.1.12", "SHA384-RSA"),
    ("1.2.840.113549.1.1.13", "SHA512-RSA"),
    ("1.2.840.113549.1.1.10", "RSASSA-PSS"),
    ("1.2.840.10040.4.3", "DSA-SHA1"),
    ("2.16.840.1.101.3.4.3.2", "DSA-SHA256"),
    ("1.2.840.10045.4.1", "ECDSA-SHA1"),
    ("1.2.840.10045.4.3.2", "ECDSA-SHA256"),
    ("1.2.840.10045.4.3.3", "ECDSA-SHA384"),
    ("1.2.840.10045.4.3.4", "ECDSA-SHA512"),
    ("1.3.101.112", "Ed25519"),
];

/// Signature algorithms considered outdated.
const WEAK_SIGNATURE_ALGORITHMS: &[&str] = &[
    "1.2.840.113549.1.1.2",
    "1.2.840.113549.1.1.4",
    "1.2.840.113549.1.1.5",
    "1.2.840.10040.4.3",
    "1.2.840.10045.4.1",
];

/// Human-readable name of the certificate's signature algorithm.
///
/// Unknown algorithms are reported by their dotted OID.
pub(crate) fn signature_algorithm_name(cert: &X509Certificate<'_>) -> String {
    let oid = cert.signature_algorithm.algorithm.to_id_string();
    SIGNATURE_ALGORITHMS
        .iter()
        .find(|(known, _)| *known == oid)
        .map(|(_, name)| name.to_string())
        .unwrap_or(oid)
}

/// First common name of `name`, empty when there is none.
pub(crate) fn common_name(name: &X509Name<'_>) -> String {
    name.iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Whether the certificate's not-after time lies in the past.
pub(crate) fn is_expired(cert: &X509Certificate<'_>) -> bool {
    cert.validity().not_after.timestamp() < chrono::Utc::now().timestamp()
}

/// Whether the certificate is self-signed.
///
/// Byte-equal issuer and subject is sufficient; otherwise the certificate's
/// signature must verify under its own key.
pub(crate) fn is_self_signed(cert: &X509Certificate<'_>) -> bool {
    cert.issuer().as_raw() == cert.subject().as_raw() || cert.verify_signature(None).is_ok()
}

/// Classifies the order of a presented chain, leaf first.
///
/// Returns `"single"` for a bare leaf, `"not"` when the leaf's issuer appears
/// after position 1, and `"yes"` otherwise (including when no issuer is
/// present at all).
pub(crate) fn chain_order(chain: &[X509Certificate<'_>]) -> &'static str {
    let Some((leaf, rest)) = chain.split_first() else {
        return "single";
    };
    if rest.is_empty() {
        return "single";
    }
    let issuer_position = rest.iter().position(|candidate| {
        candidate.subject().as_raw() == leaf.issuer().as_raw()
            && leaf.verify_signature(Some(candidate.public_key())).is_ok()
    });
    match issuer_position {
        Some(pos) if pos > 0 => "not",
        _ => "yes",
    }
}

/// Whether the certificate's SAN entries cover `host`.
///
/// DNS names match case-insensitively, with a leading `*.` covering exactly one
/// label. IP literals only match IP SAN entries.
pub(crate) fn matches_hostname(cert: &X509Certificate<'_>, host: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let ip = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse::<IpAddr>()
        .ok();

    let Ok(Some(san)) = cert.subject_alternative_name() else {
        return false;
    };
    san.value.general_names.iter().any(|name| match (name, ip) {
        (GeneralName::DNSName(pattern), None) => {
            matches_domain(&host, &pattern.trim_end_matches('.').to_ascii_lowercase())
        }
        (GeneralName::IPAddress(bytes), Some(IpAddr::V4(v4))) => *bytes == v4.octets(),
        (GeneralName::IPAddress(bytes), Some(IpAddr::V6(v6))) => *bytes == v6.octets(),
        _ => false,
    })
}

/// Domain matching with wildcard support.
fn matches_domain(query: &str, pattern: &str) -> bool {
    if query == pattern {
        return true;
    }

    // Wildcards match exactly one subdomain level
    if let Some(suffix) = pattern.strip_prefix("*.") {
        if let Some(prefix) = query.strip_suffix(suffix) {
            if let Some(label) = prefix.strip_suffix('.') {
                return !label.is_empty() && !label.contains('.');
            }
        }
    }

    false
}

/// URLs of the `caIssuers` entries in the Authority Information Access extension.
pub(crate) fn ca_issuer_urls(cert: &X509Certificate<'_>) -> Vec<String> {
    let mut urls = Vec::new();
    for ext in cert.extensions() {
        if let ParsedExtension::AuthorityInfoAccess(aia) = ext.parsed_extension() {
            for desc in &aia.accessdescs {
                if desc.access_method.to_id_string() != OID_CA_ISSUERS {
                    continue;
                }
                if let GeneralName::URI(uri) = &desc.access_location {
                    urls.push(uri.to_string());
                }
            }
        }
    }
    urls
}

/// Weak key or signature algorithm warning for the certificate, empty when none.
///
/// When several checks fire, the last one wins: key size, then signature
/// algorithm, then RSA exponent and modulus sanity.
pub(crate) fn alg_warning(cert: &X509Certificate<'_>) -> String {
    let mut warning = String::new();
    let parsed = cert.public_key().parsed();

    let (alg, bits) = match &parsed {
        Ok(PublicKey::RSA(rsa)) => ("RSA", bit_len(rsa.modulus)),
        Ok(PublicKey::DSA(y)) => {
            let params = cert.public_key().algorithm.parameters.as_ref();
            ("DSA", dsa_key_bits(params.map(|p| p.as_bytes()), y))
        }
        Ok(PublicKey::EC(_)) => ("ECDSA", ec_bits(&cert.public_key().subject_public_key.data)),
        _ => ("", 0),
    };

    if (alg == "RSA" || alg == "DSA") && bits < 2048 {
        warning = format!("Size of {alg} key should be at least 2048 bits");
    }
    if alg == "ECDSA" && bits < 224 {
        warning = format!("Size of {alg} key should be at least 224 bits");
    }

    let sig_oid = cert.signature_algorithm.algorithm.to_id_string();
    if WEAK_SIGNATURE_ALGORITHMS.contains(&sig_oid.as_str()) {
        warning = format!(
            "Signed with {}, which is an outdated signature algorithm",
            signature_algorithm_name(cert)
        );
    }

    if let Ok(PublicKey::RSA(rsa)) = &parsed {
        if exponent_value(rsa.exponent) < 3 {
            warning = "Public key exponent in RSA key is less than 3".to_string();
        }
        let zero = rsa.modulus.iter().all(|b| *b == 0);
        let negative = rsa.modulus.first().is_some_and(|b| b & 0x80 != 0);
        if zero || negative {
            warning = "Public key modulus in RSA key appears to be zero/negative".to_string();
        }
    }

    warning
}

/// Number of significant bits in a big-endian unsigned integer.
fn bit_len(bytes: &[u8]) -> usize {
    let significant: &[u8] = match bytes.iter().position(|b| *b != 0) {
        Some(start) => &bytes[start..],
        None => return 0,
    };
    (significant.len() - 1) * 8 + (8 - significant[0].leading_zeros() as usize)
}

/// DSA key size: the length of the prime `p`, the first integer of the
/// `Dss-Parms` sequence content. Falls back to the public value when the
/// parameters are absent or unreadable.
fn dsa_key_bits(params: Option<&[u8]>, y: &[u8]) -> usize {
    params
        .and_then(|content| parse_der_integer(content).ok())
        .and_then(|(_, p)| p.as_slice().ok().map(bit_len))
        .unwrap_or_else(|| bit_len(y))
}

/// Field size of an encoded EC point.
fn ec_bits(point: &[u8]) -> usize {
    match point.first() {
        Some(0x04) => (point.len() - 1) / 2 * 8,
        Some(0x02) | Some(0x03) => (point.len() - 1) * 8,
        _ => 0,
    }
}

/// Value of a big-endian exponent, saturating at `u64::MAX`.
fn exponent_value(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .fold(0u64, |acc, b| acc.saturating_mul(256).saturating_add(*b as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_domain_exact_and_wildcard() {
        assert!(matches_domain("example.com", "example.com"));
        assert!(matches_domain("sub.example.com", "*.example.com"));
        assert!(!matches_domain("example.com", "*.example.com"));
        assert!(!matches_domain("a.b.example.com", "*.example.com"));
        assert!(!matches_domain("other.com", "example.com"));
    }

    #[test]
    fn test_bit_len() {
        assert_eq!(bit_len(&[]), 0);
        assert_eq!(bit_len(&[0, 0]), 0);
        assert_eq!(bit_len(&[0x00, 0x80, 0x00]), 16);
        assert_eq!(bit_len(&[0x01]), 1);
    }

    #[test]
    fn test_dsa_key_bits_measures_the_prime() {
        // SEQUENCE content: p (2048 bits), q and g
        let mut params = vec![0x02, 0x82, 0x01, 0x01, 0x00, 0x80];
        params.extend([0u8; 255]);
        params.extend([0x02, 0x01, 0x05, 0x02, 0x01, 0x02]);
        // Public value with leading zero bits
        let mut y = vec![0x00, 0x01];
        y.extend([0xffu8; 200]);

        assert_eq!(dsa_key_bits(Some(&params), &y), 2048);
        assert_eq!(dsa_key_bits(None, &y), 1601);
        assert_eq!(dsa_key_bits(Some(&[0xff]), &[0x80]), 8);
    }

    #[test]
    fn test_ec_bits() {
        let mut uncompressed = vec![0x04];
        uncompressed.extend([0u8; 64]);
        assert_eq!(ec_bits(&uncompressed), 256);
        let mut compressed = vec![0x02];
        compressed.extend([0u8; 48]);
        assert_eq!(ec_bits(&compressed), 384);
        assert_eq!(ec_bits(&[]), 0);
    }

    #[test]
    fn test_exponent_value() {
        assert_eq!(exponent_value(&[0x01, 0x00, 0x01]), 65537);
        assert_eq!(exponent_value(&[0x01]), 1);
        assert_eq!(exponent_value(&[0xff; 12]), u64::MAX);
    }
}
