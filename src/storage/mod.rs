//! TXT record and account storage.
//!
//! A generic interface for serving [RFC-8555][RFC-8555] [DNS-01] challenge response values by
//! FQDN, and for resolving the accounts allowed to change them.
//!
//! Three implementations are provided and behave identically at the [`Storage`] interface:
//!
//! * [`memory::MemoryStorage`], not durable across restarts.
//! * [`sqlite::SqliteStorage`], an SQLite database with a single-connection write pool and a
//!   multi-connection read pool.
//! * [`kv::RedbStorage`], a [redb] key-value database using prefix scans, with background
//!   compaction.
//!
//! Each can be opened read-only, in which case every mutating operation returns
//! [`Error::ReadOnly`] without touching stored data.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//! [redb]: https://www.redb.org

use crate::cidr::CidrList;
use crate::config::Config;
use crate::error::Error;
use crate::password::PasswordHasher;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use trust_dns_server::client::rr::LowerName;

pub mod kv;
pub mod memory;
pub mod sqlite;
#[cfg(test)]
mod tests;

pub use kv::RedbStorage;
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

/// `DynStorage` is a [`Storage`] shared by the DNS server and HTTP API. Every implementation
/// synchronizes internally, so no outer lock is needed.
pub type DynStorage = Arc<dyn Storage>;

/// An API user authorized to manage TXT records within `zone`.
///
/// `(username, zone)` identifies an account; one username may own accounts for several zones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub username: String,
    /// Digest produced by [`PasswordHasher::hash`][crate::password::PasswordHasher::hash]. The
    /// plaintext password is never stored.
    pub password_digest: String,
    pub zone: LowerName,
    /// Client networks the account may be used from. Empty means no per-account restriction.
    pub allowed_ips: CidrList,
}

/// An async trait describing storage of [RFC-8555][RFC-8555] [DNS-01] challenge response
/// values, keyed by the FQDN they should be served for in the [DNS server][crate::dns], along
/// with the accounts allowed to change them.
///
/// All names are expected in canonical form (see [`canonical_name`][crate::zones::canonical_name]).
///
/// [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
/// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    /// Get the TXT values for `fqdn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RecordNotFound`] when there are none; an empty set is never returned.
    async fn get_records(&self, fqdn: &LowerName) -> Result<Vec<String>, Error>;

    /// Add a TXT value for `fqdn`. Adding a value that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] on read-only storage, or a storage fault.
    async fn present_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error>;

    /// Remove a TXT value for `fqdn`. Removing from an FQDN without any values is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueNotFound`] when `fqdn` has values but not `value`,
    /// [`Error::ReadOnly`] on read-only storage, or a storage fault.
    async fn cleanup_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error>;

    /// Store a new account.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountExists`] if `(username, zone)` is already registered,
    /// [`Error::ReadOnly`] on read-only storage, or a storage fault.
    async fn register_account(&self, account: &Account) -> Result<(), Error>;

    /// Resolve the account owned by `username` with the longest zone containing `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AccountNotFound`] if no zone of the user contains `name`.
    async fn get_account(&self, username: &str, name: &LowerName) -> Result<Account, Error>;

    /// Release the storage engine. Operations after closing fail.
    ///
    /// # Errors
    ///
    /// Returns a storage fault if the engine doesn't shut down cleanly.
    async fn close(&self) -> Result<(), Error>;
}

/// Storage engine selection, the `storage` key of the [`Config`][crate::config::Config].
#[serde_as]
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite {
        path: PathBuf,
    },
    Redb {
        path: PathBuf,
        #[serde_as(as = "DurationSeconds<u64>")]
        #[serde(default = "kv::default_gc_interval")]
        gc_interval: Duration,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Redb {
            path: PathBuf::from("acme.redb"),
            gc_interval: kv::default_gc_interval(),
        }
    }
}

/// Open the configured storage engine.
///
/// # Errors
///
/// Returns a storage fault if the engine can't be opened, e.g. a read-only open of a database
/// that doesn't exist yet.
pub async fn open(config: &StorageConfig, read_only: bool) -> Result<DynStorage, Error> {
    Ok(match config {
        StorageConfig::Memory => Arc::new(MemoryStorage::new(read_only)),
        StorageConfig::Sqlite { path } => Arc::new(SqliteStorage::open(path, read_only).await?),
        StorageConfig::Redb { path, gc_interval } => {
            Arc::new(RedbStorage::open(path, read_only, *gc_interval)?)
        }
    })
}

/// Hash and store the accounts listed in `config`.
///
/// Accounts already present (from an earlier start against persistent storage) are logged and
/// skipped.
///
/// # Errors
///
/// Returns the first hashing or storage error other than [`Error::AccountExists`].
pub async fn register_config_accounts(config: &Config, storage: &DynStorage) -> Result<(), Error> {
    let hasher = PasswordHasher::new(config.password_cost);
    for account in &config.accounts {
        let password = account.password.clone();
        let password_digest = tokio::task::spawn_blocking(move || hasher.hash(&password)).await??;
        let registered = Account {
            username: account.username.clone(),
            password_digest,
            zone: account.zone.clone(),
            allowed_ips: account.allowfrom.clone(),
        };
        match storage.register_account(&registered).await {
            Ok(()) => tracing::info!(
                "registered account \"{}\" for \"{}\" from config",
                registered.username,
                registered.zone
            ),
            Err(err @ Error::AccountExists { .. }) => tracing::info!("skipping config account: {err}"),
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Pick the account with the longest zone containing `name`.
///
/// `candidates` are all accounts of one user; used by the engines that can't push the match
/// into a query.
pub(crate) fn longest_zone_match<I>(candidates: I, name: &str) -> Option<Account>
where
    I: IntoIterator<Item = Account>,
{
    candidates
        .into_iter()
        .filter(|account| crate::zones::zone_contains(&account.zone.to_string(), name))
        .max_by_key(|account| account.zone.to_string().len())
}
