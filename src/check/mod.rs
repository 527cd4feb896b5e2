//! Offline passes over scan records.
//!
//! - `check_domain`: normalizes every usable answer into `MethodConfig`s,
//!   assigns per-entry and per-method verdicts and flags paths of the same
//!   mechanism that disagree.
//! - `diff::diff_domain`: the port-usage view, additionally comparing
//!   mechanisms with each other.
//! - `stats::StatsReport`: counters over check records.
//!
//! None of these touch the network.

mod consistency;
pub mod diff;
mod normalize;
pub mod stats;

use crate::models::{DomainCheckResult, DomainResult};

pub use consistency::{dedup_configs, protocol_key, KeyFields};
pub use diff::diff_domain;
pub use normalize::{normalize_autoconfig, normalize_autodiscover, normalize_srv, service_type};
pub use stats::{MechanismStats, StatsReport};

/// Autodiscover payloads that carry a document rather than a classified failure.
pub(crate) fn is_autodiscover_payload(config: &str) -> bool {
    !config.is_empty()
        && !["Bad", "Errorcode", "Non-valid"]
            .iter()
            .any(|prefix| config.starts_with(prefix))
}

pub(crate) fn is_autoconfig_payload(config: &str) -> bool {
    !config.is_empty()
}

/// Normalizes and compares everything one domain's scan produced.
///
/// Returns `None` when there was nothing to normalize.
pub fn check_domain(result: &DomainResult) -> Option<DomainCheckResult> {
    let autodiscover: Vec<_> = result
        .autodiscover
        .iter()
        .filter(|a| is_autodiscover_payload(&a.config))
        .filter_map(|a| normalize_autodiscover(&a.config))
        .collect();
    let autoconfig: Vec<_> = result
        .autoconfig
        .iter()
        .filter(|a| is_autoconfig_payload(&a.config))
        .filter_map(|a| normalize_autoconfig(&a.config))
        .collect();
    let srv = result.srv.has_records().then(|| normalize_srv(&result.srv));

    if autodiscover.is_empty() && autoconfig.is_empty() && srv.is_none() {
        log::debug!("Nothing to check for {}", result.domain);
        return None;
    }

    let (ad_consistent, autodiscover) = dedup_configs(autodiscover, KeyFields::Autodiscover);
    let (ac_consistent, autoconfig) = dedup_configs(autoconfig, KeyFields::Autoconfig);

    Some(DomainCheckResult {
        domain: result.domain.clone(),
        autodiscover_check_result: autodiscover,
        autoconfig_check_result: autoconfig,
        srv_check_result: srv,
        autodiscover_inconsistent: !ad_consistent,
        autoconfig_inconsistent: !ac_consistent,
        inconsistent: !ad_consistent || !ac_consistent,
    })
}
