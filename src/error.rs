//! Error types.

use std::net::IpAddr;
use trust_dns_server::client::rr::LowerName;
use trust_dns_server::proto::error::ProtoError;

/// Error enumerates the possible error states of the storage engines, the configuration layer
/// and the DNS server.
///
/// Rejections of HTTP API requests are not represented here: the
/// [auth pipeline][crate::api#authentication] produces its own machine-readable error codes.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned by [`Storage::get_records`][crate::storage::Storage::get_records] when no TXT
    /// values exist for the FQDN. An empty record set is never returned in its place.
    #[error("no records for \"{0}\"")]
    RecordNotFound(LowerName),

    /// Returned by [`Storage::get_account`][crate::storage::Storage::get_account] when no
    /// account owned by the username has a zone containing the queried name.
    #[error("no account for \"{username}\" authorized for \"{name}\"")]
    AccountNotFound { username: String, name: LowerName },

    /// Returned by [`Storage::cleanup_record`][crate::storage::Storage::cleanup_record] when the
    /// FQDN has TXT values, but not the one being removed.
    #[error("value \"{value}\" not present for \"{fqdn}\"")]
    ValueNotFound { fqdn: LowerName, value: String },

    /// Returned when registering a `(username, zone)` pair that already exists.
    #[error("account \"{username}\" already exists for zone \"{zone}\"")]
    AccountExists { username: String, zone: LowerName },

    /// Returned by every mutating storage operation on a storage engine opened read-only.
    #[error("storage is in read-only mode")]
    ReadOnly,

    /// Returned by storage operations performed after
    /// [`Storage::close`][crate::storage::Storage::close].
    #[error("storage is closed")]
    Closed,

    /// Returned when the SQLite storage engine fails.
    #[error("SQLite error")]
    Sql(#[from] sqlx::Error),

    /// Returned when the redb storage engine fails.
    #[error("redb error")]
    Kv(#[from] redb::Error),

    /// Returned when a blocking storage task panics or is cancelled.
    #[error("storage task failed")]
    Task(#[from] tokio::task::JoinError),

    /// Returned when a password can't be hashed.
    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    /// Returned when an IP allow-list entry is neither an IP address nor a CIDR network.
    #[error("invalid IP or CIDR: \"{0}\"")]
    InvalidCidr(String),

    /// Returned when a string can't be parsed as a domain name.
    #[error("invalid domain name \"{0}\"")]
    InvalidName(String),

    /// Returned when the configuration lists no authoritative zones.
    #[error("at least one zone must be configured")]
    NoZones,

    /// Returned when a configured account's zone isn't within one of the configured zones.
    #[error("zone \"{0}\" is not within a configured zone")]
    ZoneNotAuthoritative(LowerName),

    /// Returned when the [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`] is
    /// not a loopback address, or an address within a private network space, while
    /// [`Config::require_auth`][`crate::config::Config::require_auth`] is off. Without
    /// credentials the HTTP API relies entirely on the network for access control.
    #[error("API bind address ({0}) must be a loopback or private IP when require_auth is off")]
    InsecureAPIBind(IpAddr),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON fails, e.g. when
    /// [trying to load a `Config`][crate::config::Config::try_from_file] or decoding a stored
    /// account.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),

    /// Returned when the HTTP API server can't bind or fails while serving.
    #[error("HTTP server error")]
    HTTP(#[from] hyper::Error),

    /// Returned when a metric can't be created, registered or encoded.
    #[error("metrics error")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// True for the recoverable absent-record and absent-account conditions.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::RecordNotFound(_) | Error::AccountNotFound { .. } | Error::ValueNotFound { .. }
        )
    }
}

/// Shorthand for redb results: every redb error type converts into [`redb::Error`].
pub(crate) fn kv<E: Into<redb::Error>>(err: E) -> Error {
    Error::Kv(err.into())
}
