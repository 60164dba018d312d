//! Client IP normalization.

use std::net::Ipv4Addr;

use crate::storage::models::defaults;

/// Normalize a raw client address for storage and lookup.
///
/// Keeps the substring after the last colon, which unwraps IPv4-mapped IPv6
/// (`::ffff:203.0.113.5`) and drops a trailing `:port`. Anything that is not
/// then a dotted IPv4 address becomes the loopback placeholder.
pub fn normalize_ip(raw: Option<&str>) -> String {
    let tail = raw
        .and_then(|s| s.rsplit(':').next())
        .map(str::trim)
        .unwrap_or_default();

    match tail.parse::<Ipv4Addr>() {
        Ok(_) => tail.to_string(),
        Err(_) => defaults::IP_ADDRESS.to_string(),
    }
}
