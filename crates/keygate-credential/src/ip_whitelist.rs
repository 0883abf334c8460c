//! Source-address whitelisting.
//!
//! A credential may carry a whitelist of exact IP addresses and CIDR
//! ranges. An empty or absent whitelist allows every address. Entries
//! are validated when written; a malformed entry that nonetheless
//! reaches storage is skipped with a warning rather than failing the
//! check, so one bad entry cannot lock a caller out of the rest of the
//! list.

use std::net::IpAddr;

use ipnetwork::IpNetwork;

use crate::error::{CredentialError, Result};

/// Validate whitelist entries before they are stored.
///
/// Accepts exact addresses (`203.0.113.7`, `2001:db8::1`) and CIDR
/// ranges (`192.168.1.0/24`). The first malformed entry fails the whole
/// write.
pub fn validate_whitelist(entries: &[String]) -> Result<()> {
    for entry in entries {
        if entry.parse::<IpAddr>().is_err() && entry.parse::<IpNetwork>().is_err() {
            return Err(CredentialError::InvalidWhitelistEntry(entry.clone()));
        }
    }
    Ok(())
}

fn entry_matches(entry: &str, addr: IpAddr) -> Option<bool> {
    if let Ok(exact) = entry.parse::<IpAddr>() {
        return Some(exact == addr);
    }
    if let Ok(network) = entry.parse::<IpNetwork>() {
        return Some(network.contains(addr));
    }
    None
}

/// Check a caller address against a credential's whitelist.
///
/// Returns `true` when the whitelist is empty or any entry matches.
/// Stored entries that no longer parse are skipped with a warning.
#[must_use]
pub fn is_ip_whitelisted(whitelist: &[String], addr: IpAddr) -> bool {
    if whitelist.is_empty() {
        return true;
    }
    whitelist.iter().any(|entry| match entry_matches(entry, addr) {
        Some(matched) => matched,
        None => {
            tracing::warn!(entry = %entry, "Skipping malformed whitelist entry");
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn empty_whitelist_allows_everything() {
        assert!(is_ip_whitelisted(&[], addr("203.0.113.7")));
    }

    #[test]
    fn exact_address_match() {
        let list = vec!["203.0.113.7".to_string()];
        assert!(is_ip_whitelisted(&list, addr("203.0.113.7")));
        assert!(!is_ip_whitelisted(&list, addr("203.0.113.8")));
    }

    #[test]
    fn cidr_range_match() {
        let list = vec!["192.168.1.0/24".to_string()];
        assert!(is_ip_whitelisted(&list, addr("192.168.1.5")));
        assert!(!is_ip_whitelisted(&list, addr("192.168.2.5")));
    }

    #[test]
    fn any_entry_suffices() {
        let list = vec!["10.0.0.0/8".to_string(), "203.0.113.7".to_string()];
        assert!(is_ip_whitelisted(&list, addr("10.1.2.3")));
        assert!(is_ip_whitelisted(&list, addr("203.0.113.7")));
        assert!(!is_ip_whitelisted(&list, addr("172.16.0.1")));
    }

    #[test]
    fn ipv6_entries_work() {
        let list = vec!["2001:db8::/32".to_string()];
        assert!(is_ip_whitelisted(&list, addr("2001:db8::1")));
        assert!(!is_ip_whitelisted(&list, addr("2001:db9::1")));
    }

    #[test]
    fn malformed_stored_entry_is_skipped_not_fatal() {
        let list = vec!["not-an-ip".to_string(), "192.168.1.0/24".to_string()];
        assert!(is_ip_whitelisted(&list, addr("192.168.1.9")));
        assert!(!is_ip_whitelisted(&list, addr("8.8.8.8")));
    }

    #[test]
    fn validation_rejects_malformed_entries() {
        assert!(validate_whitelist(&["192.168.1.0/24".to_string()]).is_ok());
        assert!(validate_whitelist(&["2001:db8::1".to_string()]).is_ok());

        let err = validate_whitelist(&["192.168.1.0/33".to_string()]).unwrap_err();
        match err {
            CredentialError::InvalidWhitelistEntry(e) => assert_eq!(e, "192.168.1.0/33"),
            other => panic!("expected InvalidWhitelistEntry, got {other:?}"),
        }
    }
}
