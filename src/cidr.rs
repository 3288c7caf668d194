//! IP address and CIDR network allow-lists.
//!
//! Used for the global API allow-list, per-account allow-lists and to check client addresses
//! extracted from HTTP requests.

use crate::error::Error;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// A list of IP networks. Bare IP addresses are held as single-host networks.
///
/// An empty list places no restriction: [`CidrList::contains`] is true for every address.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CidrList(Vec<IpNetwork>);

impl CidrList {
    /// Parse each entry as an IP address or CIDR network. IPv6 entries may be wrapped in
    /// brackets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCidr`] for the first entry that parses as neither.
    pub fn parse<S: AsRef<str>>(entries: &[S]) -> Result<Self, Error> {
        entries
            .iter()
            .map(|entry| parse_network(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }

    /// Parse a comma separated list, skipping empty entries.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCidr`] for the first invalid entry.
    pub fn parse_joined(joined: &str) -> Result<Self, Error> {
        let entries: Vec<&str> = joined
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        Self::parse(&entries)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the list is empty, or any network in it contains `ip`. IPv4-mapped IPv6
    /// addresses (as reported by dual-stack listeners) are matched as IPv4.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = ip.to_canonical();
        self.0.is_empty() || self.0.iter().any(|network| network.contains(ip))
    }
}

fn parse_network(entry: &str) -> Result<IpNetwork, Error> {
    let sanitized: String = entry.trim().chars().filter(|c| !matches!(c, '[' | ']')).collect();
    IpNetwork::from_str(&sanitized).map_err(|_| Error::InvalidCidr(entry.to_string()))
}

/// Parse a single IP address, tolerating whitespace and IPv6 brackets.
#[must_use]
pub fn parse_ip(raw: &str) -> Option<IpAddr> {
    let trimmed = raw.trim().trim_start_matches('[').trim_end_matches(']');
    IpAddr::from_str(trimmed).ok()
}

impl TryFrom<Vec<String>> for CidrList {
    type Error = Error;

    fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
        Self::parse(&entries)
    }
}

impl From<CidrList> for Vec<String> {
    fn from(list: CidrList) -> Self {
        list.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for CidrList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&joined.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn empty_list_allows_everything() {
        let list = CidrList::default();
        assert!(list.contains(ip("192.168.1.1")));
        assert!(list.contains(ip("2001:db8::1")));
    }

    #[test]
    fn contains_exact_ip_and_network() {
        let list = CidrList::parse(&["192.168.1.1", "10.0.0.0/24", "2001:db8::/32"]).unwrap();
        assert!(list.contains(ip("192.168.1.1")));
        assert!(!list.contains(ip("192.168.1.2")));
        assert!(list.contains(ip("10.0.0.42")));
        assert!(!list.contains(ip("10.0.1.1")));
        assert!(list.contains(ip("2001:db8:ffff::1")));
        assert!(!list.contains(ip("2001:db9::1")));
    }

    #[test]
    fn contains_ipv4_mapped_addresses() {
        let list = CidrList::parse(&["10.0.0.0/8", "192.168.1.1"]).unwrap();
        assert!(list.contains(ip("::ffff:10.1.2.3")));
        assert!(list.contains(ip("::ffff:192.168.1.1")));
        assert!(!list.contains(ip("::ffff:11.1.2.3")));
        assert!(!list.contains(ip("::10.1.2.3")));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(
            CidrList::parse(&["10.0.0.0/24", "not-an-ip"]),
            Err(Error::InvalidCidr(entry)) if entry == "not-an-ip"
        ));
        assert!(CidrList::parse(&["10.0.0.0/33"]).is_err());
        assert!(CidrList::parse(&["256.0.0.1"]).is_err());
    }

    #[test]
    fn parse_accepts_bracketed_ipv6() {
        let list = CidrList::parse(&["[2001:db8::1]", "[2001:db8:1::]/48"]).unwrap();
        assert!(list.contains(ip("2001:db8::1")));
        assert!(list.contains(ip("2001:db8:1::5")));
    }

    #[test]
    fn joined_round_trip() {
        let list = CidrList::parse_joined(" 10.0.0.0/8, ,192.168.1.1 ").unwrap();
        assert_eq!(list.to_string(), "10.0.0.0/8,192.168.1.1/32");
        assert_eq!(CidrList::parse_joined(&list.to_string()).unwrap(), list);
        assert!(CidrList::parse_joined("").unwrap().is_empty());
    }

    #[test]
    fn parse_ip_strips_brackets_and_space() {
        assert_eq!(parse_ip(" 127.0.0.1 "), Some(ip("127.0.0.1")));
        assert_eq!(parse_ip("[::1]"), Some(ip("::1")));
        assert_eq!(parse_ip(""), None);
        assert_eq!(parse_ip("example.com"), None);
    }
}
