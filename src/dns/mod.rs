//! DNS queries against a single recursive resolver.
//!
//! This module provides async DNS operations on query messages built with
//! `hickory-proto` and exchanged through `hickory-client` (UDP, TCP when the
//! answer is truncated):
//! - SRV records with the DNSSEC authenticated-data (AD) flag
//! - Zone authority (SOA / NS)
//! - CNAME chains with retry
//! - Highest-priority MX host and its Autoconfig lookup domains
//!
//! All operations bear a fixed timeout and report failures as `DnsError`.

mod client;
mod extract;
mod records;

// Re-export public API
pub use client::DnsClient;
pub use extract::extract_mx_domains;
pub use records::{sort_srv_records, Authority, SrvAnswer};

#[cfg(test)]
pub(crate) mod test_server;
