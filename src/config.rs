use crate::cidr::CidrList;
use crate::error::Error;
use crate::password::DEFAULT_COST;
use crate::storage::StorageConfig;
use crate::zones::{CanonicalName, Fallthrough, Zones};
use ipnetwork::IpNetwork;
use lazy_static::lazy_static;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::{LowerName, Name};

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Zones the DNS server is authoritative for. Challenge names outside them are never
    /// answered, and the API refuses records and accounts outside them.
    #[serde_as(as = "Vec<CanonicalName>")]
    pub zones: Vec<LowerName>,
    /// Forward challenge names without records to the next handler instead of answering
    /// NXDOMAIN.
    #[serde(default)]
    pub fallthrough: bool,
    /// Limits [`Config::fallthrough`] to names within these zones. Empty means all names.
    #[serde_as(as = "Vec<CanonicalName>")]
    #[serde(default)]
    pub fallthrough_zones: Vec<LowerName>,

    pub dns_udp_bind_addr: SocketAddr,
    pub dns_tcp_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_tcp_timeout")]
    pub dns_tcp_timeout: Duration,

    /// Enables the HTTP API. Without it the storage is opened read-only.
    #[serde(default)]
    pub api_bind_addr: Option<SocketAddr>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_api_timeout")]
    pub api_timeout: Duration,
    /// Global API allow-list. Empty allows every client.
    #[serde(default)]
    pub allowfrom: CidrList,
    /// Header to read the client IP from, e.g. `X-Forwarded-For`, when behind a proxy.
    #[serde(default)]
    pub extract_ip_from_header: Option<String>,
    #[serde(default)]
    pub require_auth: bool,
    #[serde(default)]
    pub enable_registration: bool,
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde_as(as = "Option<CanonicalName>")]
    #[serde(default)]
    pub ns_domain: Option<LowerName>,
    #[serde(default)]
    pub ns_admin: Option<String>,
    #[serde_as(as = "HashMap<CanonicalName, _>")]
    #[serde(default)]
    pub addrs: HashMap<LowerName, Vec<IpAddr>>,
    #[serde_as(as = "HashMap<CanonicalName, Vec<CanonicalName>>")]
    #[serde(default)]
    pub ns_records: HashMap<LowerName, Vec<LowerName>>,
}

/// An account registered at startup.
#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct AccountConfig {
    pub username: String,
    pub password: String,
    #[serde_as(as = "CanonicalName")]
    pub zone: LowerName,
    #[serde(default)]
    pub allowfrom: CidrList,
}

fn default_dns_tcp_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_api_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_password_cost() -> u32 {
    DEFAULT_COST
}

lazy_static! {
    // NOTE(XXX): Once the "ip" feature has stabilized we can use Ipv6Addr.is_unique_local[0].
    //            Presently this feature is unstable so we home-roll. See also RFC 4193[1].
    // [0]: https://doc.rust-lang.org/std/net/struct.Ipv6Addr.html#method.is_unique_local
    // [1]: https://www.rfc-editor.org/rfc/rfc4193.html
    static ref IPV6_UNIQUE_LOCAL_NETWORK: IpNetwork = IpNetwork::from_str("fc00::/7").unwrap();
}

impl Config {
    /// Load and validate a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] or [`Error::InvalidJSON`] if the file can't be read or parsed, or
    /// the validation errors of [`Config::validate`].
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check the cross-field constraints deserialization can't express.
    ///
    /// # Errors
    ///
    /// * [`Error::NoZones`] if no zones are configured.
    /// * [`Error::ZoneNotAuthoritative`] for an account outside the configured zones.
    /// * [`Error::InsecureAPIBind`] if the API is enabled without authentication on a public
    ///   address.
    pub fn validate(&self) -> Result<(), Error> {
        if self.zones.is_empty() {
            return Err(Error::NoZones);
        }
        let zones = self.zones();
        if let Some(account) = self
            .accounts
            .iter()
            .find(|account| zones.matches(&account.zone).is_none())
        {
            return Err(Error::ZoneNotAuthoritative(account.zone.clone()));
        }
        if !self.require_auth {
            self.bind_addr_is_secure()?;
        }
        Ok(())
    }

    #[must_use]
    pub fn zones(&self) -> Zones {
        Zones::new(self.zones.clone())
    }

    #[must_use]
    pub fn fallthrough(&self) -> Fallthrough {
        Fallthrough::new(self.fallthrough, self.fallthrough_zones.clone())
    }

    /// Storage is read-only unless the API is enabled.
    #[must_use]
    pub fn read_only(&self) -> bool {
        self.api_bind_addr.is_none()
    }

    /// The SOA RNAME for [`Config::ns_admin`], accepting email address form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if the result isn't a valid name.
    pub fn ns_admin(&self) -> Result<Option<Name>, Error> {
        self.sanitized_ns_admin()
            .map(|admin| Ok(Name::from_str(&admin)?))
            .transpose()
    }

    fn sanitized_ns_admin(&self) -> Option<Cow<str>> {
        let ns_admin = self.ns_admin.as_deref()?;
        Some(match ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(ns_admin),
        })
    }

    fn bind_addr_is_secure(&self) -> Result<(), Error> {
        match self.api_bind_addr {
            None => Ok(()),
            Some(SocketAddr::V4(v4_addr)) => {
                let ip = v4_addr.ip();
                if !ip.is_loopback() && !ip.is_private() {
                    return Err(Error::InsecureAPIBind(IpAddr::V4(*ip)));
                }
                Ok(())
            }
            Some(SocketAddr::V6(v6_addr)) => {
                let ip = v6_addr.ip();
                if !ip.is_loopback() && !IPV6_UNIQUE_LOCAL_NETWORK.contains(IpAddr::V6(*ip)) {
                    return Err(Error::InsecureAPIBind(IpAddr::V6(*ip)));
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    /// Parse and validate a JSON config document.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let conf: Config = serde_json::from_str(s)?;
        conf.validate()?;
        Ok(conf)
    }
}
