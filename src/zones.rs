//! Domain name canonicalization and zone membership.

use crate::error::Error;
use serde::{Deserialize, Deserializer};
use serde_with::DeserializeAs;
use trust_dns_client::rr::{LowerName, Name};

/// The label every DNS-01 challenge name starts with.
pub const CHALLENGE_LABEL: &str = "_acme-challenge";

/// Canonicalize a domain name: lowercase, fully qualified (trailing dot).
///
/// # Errors
///
/// Returns [`Error::InvalidName`] if `raw` isn't a valid domain name.
pub fn canonical_name(raw: &str) -> Result<LowerName, Error> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidName(raw.to_string()));
    }
    let mut name = Name::from_ascii(trimmed).map_err(|_| Error::InvalidName(raw.to_string()))?;
    name.set_fqdn(true);
    Ok(LowerName::new(&name))
}

/// True if `name` is `zone` or a subdomain of it. Both must be canonical strings.
///
/// The storage engines resolve accounts with this rule, so it is written against the stored
/// string form rather than [`LowerName`].
#[must_use]
pub fn zone_contains(zone: &str, name: &str) -> bool {
    zone == "."
        || name == zone
        || name
            .strip_suffix(zone)
            .is_some_and(|rest| rest.ends_with('.'))
}

/// True if the first label of `name` is the `_acme-challenge` label.
#[must_use]
pub fn is_challenge_name(name: &LowerName) -> bool {
    name.to_string()
        .strip_prefix(CHALLENGE_LABEL)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// The set of zones a server instance is authoritative for.
#[derive(Debug, Clone, Default)]
pub struct Zones(Vec<LowerName>);

impl Zones {
    #[must_use]
    pub fn new(zones: Vec<LowerName>) -> Self {
        Self(zones)
    }

    /// The most specific configured zone containing `name`, if any.
    #[must_use]
    pub fn matches(&self, name: &LowerName) -> Option<&LowerName> {
        self.0
            .iter()
            .filter(|zone| zone.zone_of(name))
            .max_by_key(|zone| Name::from(*zone).num_labels())
    }
}

/// Decides whether a challenge name without records is forwarded downstream instead of
/// answered with NXDOMAIN.
#[derive(Debug, Clone, Default)]
pub struct Fallthrough {
    enabled: bool,
    zones: Vec<LowerName>,
}

impl Fallthrough {
    /// Fallthrough for names within `zones`, or for every name when `zones` is empty.
    #[must_use]
    pub fn new(enabled: bool, zones: Vec<LowerName>) -> Self {
        Self { enabled, zones }
    }

    #[must_use]
    pub fn through(&self, name: &LowerName) -> bool {
        self.enabled && (self.zones.is_empty() || self.zones.iter().any(|zone| zone.zone_of(name)))
    }
}

/// [`serde_with`] adapter deserializing a string into a [canonical][canonical_name]
/// [`LowerName`].
pub struct CanonicalName;

impl<'de> DeserializeAs<'de, LowerName> for CanonicalName {
    fn deserialize_as<D>(deserializer: D) -> Result<LowerName, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        canonical_name(&raw).map_err(serde::de::Error::custom)
    }
}
