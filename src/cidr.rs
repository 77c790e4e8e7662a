//! CIDR normalization for bound-address restrictions.
//!
//! Turns resolved IP address strings into single-host CIDRs (`/32` for IPv4,
//! `/128` for IPv6). The map is one-to-one and order-preserving: no sorting
//! and no deduplication, so the output compares verbatim against what the
//! backend reports in `bound_cidrs`.
//!
//! Inputs already in prefix notation are accepted and rendered in canonical
//! form.

use std::net::IpAddr;

use ipnet::IpNet;

use crate::{Error, Result};

/// Normalize one address into CIDR notation.
pub fn normalize_one(address: &str) -> Result<String> {
    let trimmed = address.trim();
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(IpNet::from(ip).to_string());
    }
    trimmed
        .parse::<IpNet>()
        .map(|net| net.to_string())
        .map_err(|_| Error::InvalidAddress(format!("'{address}' is not an IP address")))
}

/// Normalize a list of addresses, preserving order and length.
///
/// Fails on the first malformed entry; never returns a partial list.
pub fn normalize<S: AsRef<str>>(addresses: &[S]) -> Result<Vec<String>> {
    addresses
        .iter()
        .map(|a| normalize_one(a.as_ref()))
        .collect()
}
