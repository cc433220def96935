//! Route names derived from subnets.
//!
//! The name is both how a route is created and how it is found again after a
//! restart, so the mapping must never change. Substitution table:
//!
//! | character | replacement |
//! |-----------|-------------|
//! | `.`       | `-`         |
//! | `/`       | `-`         |
//!
//! prefixed with `flannel-`. An IPv4 CIDR always has exactly four octets and
//! one prefix length, so the five decimal fields stay in fixed positions and
//! two distinct subnets cannot map to the same name.

use crate::config::ROUTE_NAME_PREFIX;
use crate::models::Cidr;
use regex::Regex;
use std::sync::OnceLock;

/// Longest resource name the provider accepts.
pub const MAX_NAME_LENGTH: usize = 63;

static NAME_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_name_regex() -> &'static Regex {
    NAME_REGEX.get_or_init(|| Regex::new(r"^[a-z]([-a-z0-9]*[a-z0-9])?$").expect("Invalid Regex"))
}

/// `10.1.2.0/24` -> `flannel-10-1-2-0-24`.
pub fn format_route_name(subnet: &Cidr) -> String {
    let replaced: String = subnet
        .to_string()
        .chars()
        .map(|c| match c {
            '.' | '/' => '-',
            other => other,
        })
        .collect();
    format!("{ROUTE_NAME_PREFIX}-{replaced}")
}

/// True when `name` is a legal provider resource name (RFC 1035 label).
pub fn is_valid_resource_name(name: &str) -> bool {
    name.len() <= MAX_NAME_LENGTH && get_name_regex().is_match(name)
}
