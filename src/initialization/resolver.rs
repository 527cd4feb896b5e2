//! DNS resolver address initialization.

use std::net::SocketAddr;

use crate::config::Config;
use crate::error_handling::InitializationError;

/// Parses the configured recursive resolver address.
///
/// A bare IP address gets port 53.
///
/// # Errors
///
/// Returns `InitializationError::ResolverAddressError` if the address is neither
/// `ip:port` nor a bare IP.
pub fn init_resolver(config: &Config) -> Result<SocketAddr, InitializationError> {
    let raw = config.resolver.trim();
    if let Ok(addr) = raw.parse::<SocketAddr>() {
        return Ok(addr);
    }
    raw.parse::<std::net::IpAddr>()
        .map(|ip| SocketAddr::new(ip, 53))
        .map_err(|_| InitializationError::ResolverAddressError(raw.to_string()))
}
