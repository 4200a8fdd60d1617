//! Selection of the services colocated with the polled registry.
//!
//! A collector runs next to a registry proxy and only reports the services
//! hosted on the same machine. The default `Prefix` policy compares host
//! strings by prefix, so `10.0.0.12` counts as local to a registry on
//! `10.0.0.1`. `Exact` avoids that collision when hosts are known by the same
//! textual address on both sides.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Strategy deciding whether a discovered service is local.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalityPolicy {
    /// Service host starts with the registry host.
    #[default]
    Prefix,
    /// Service host equals the registry host.
    Exact,
    /// Every discovered service is polled.
    All,
}

impl LocalityPolicy {
    /// Returns whether a service at `service_address` is local to `registry_host`.
    ///
    /// Records without an address are never local.
    pub fn is_local(&self, service_address: &str, registry_host: &str) -> bool {
        if service_address.is_empty() {
            return false;
        }
        let host = address_host(service_address);
        match self {
            LocalityPolicy::Prefix => host.starts_with(registry_host),
            LocalityPolicy::Exact => host == registry_host,
            LocalityPolicy::All => true,
        }
    }
}

impl fmt::Display for LocalityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalityPolicy::Prefix => write!(f, "prefix"),
            LocalityPolicy::Exact => write!(f, "exact"),
            LocalityPolicy::All => write!(f, "all"),
        }
    }
}

impl FromStr for LocalityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "prefix" => Ok(LocalityPolicy::Prefix),
            "exact" => Ok(LocalityPolicy::Exact),
            "all" => Ok(LocalityPolicy::All),
            other => Err(format!(
                "unknown locality policy '{}' (expected prefix, exact or all)",
                other
            )),
        }
    }
}

/// Host part of a `host:port` address. Bracketed IPv6 hosts keep their brackets.
pub fn address_host(address: &str) -> &str {
    if address.starts_with('[') {
        return match address.find(']') {
            Some(end) => &address[..=end],
            None => address,
        };
    }
    match address.rsplit_once(':') {
        Some((host, _)) => host,
        None => address,
    }
}

/// Host part of an endpoint URL such as `http://10.0.0.1:6000/v3.0`.
pub fn endpoint_host(endpoint: &str) -> &str {
    let without_scheme = match endpoint.split_once("://") {
        Some((_, rest)) => rest,
        None => endpoint,
    };
    let authority = match without_scheme.find('/') {
        Some(idx) => &without_scheme[..idx],
        None => without_scheme,
    };
    address_host(authority)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_host() {
        assert_eq!(endpoint_host("http://10.0.0.1:6000"), "10.0.0.1");
        assert_eq!(endpoint_host("http://10.0.0.1:6000/v3.0"), "10.0.0.1");
        assert_eq!(endpoint_host("10.0.0.1:6000"), "10.0.0.1");
        assert_eq!(endpoint_host("http://proxy.local"), "proxy.local");
        assert_eq!(endpoint_host("http://[::1]:6000"), "[::1]");
    }

    #[test]
    fn test_address_host() {
        assert_eq!(address_host("10.0.0.1:6200"), "10.0.0.1");
        assert_eq!(address_host("[fe80::1]:6200"), "[fe80::1]");
        assert_eq!(address_host("node1"), "node1");
    }

    #[test]
    fn test_prefix_policy() {
        let policy = LocalityPolicy::Prefix;
        assert!(policy.is_local("10.0.0.1:6200", "10.0.0.1"));
        assert!(!policy.is_local("10.0.0.2:6200", "10.0.0.1"));
        assert!(!policy.is_local("", "10.0.0.1"));
    }

    #[test]
    fn test_prefix_policy_collision() {
        // Hosts sharing a textual prefix are treated as local.
        assert!(LocalityPolicy::Prefix.is_local("10.0.0.12:6200", "10.0.0.1"));
        assert!(!LocalityPolicy::Exact.is_local("10.0.0.12:6200", "10.0.0.1"));
    }

    #[test]
    fn test_exact_and_all_policies() {
        assert!(LocalityPolicy::Exact.is_local("10.0.0.1:6200", "10.0.0.1"));
        assert!(LocalityPolicy::All.is_local("192.168.1.5:6200", "10.0.0.1"));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("prefix".parse(), Ok(LocalityPolicy::Prefix));
        assert_eq!("EXACT".parse(), Ok(LocalityPolicy::Exact));
        assert_eq!("all".parse(), Ok(LocalityPolicy::All));
        assert!("nearby".parse::<LocalityPolicy>().is_err());
    }
}
