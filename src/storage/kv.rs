//! A [redb] implementation of the [`Storage`][super::Storage] trait.
//!
//! Everything lives in one table of string keys:
//!
//! ```text
//! record:<fqdn>:<value>       -> (empty)
//! account:<username>:<zone>   -> account (JSON)
//! ```
//!
//! Record sets and a user's accounts are both read with prefix scans, so no secondary index is
//! needed. A read-only open uses [`redb::ReadOnlyDatabase`], which can't begin write
//! transactions at all. Read-write opens run a background task that periodically compacts the
//! database file.
//!
//! [redb]: https://www.redb.org

use crate::cidr::CidrList;
use crate::error::{kv, Error};
use crate::storage::{Account, Storage};
use crate::zones::{canonical_name, zone_contains};
use redb::{
    Database, ReadOnlyDatabase, ReadTransaction, ReadableDatabase, ReadableTable,
    TableDefinition, WriteTransaction,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex, RwLock};
use tokio::task::JoinHandle;
use trust_dns_server::client::rr::LowerName;

const KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("acme");
const RECORD_PREFIX: &str = "record:";
const ACCOUNT_PREFIX: &str = "account:";
const EMPTY: &[u8] = &[];

pub(crate) fn default_gc_interval() -> Duration {
    Duration::from_secs(300)
}

fn record_key(fqdn: &LowerName, value: &str) -> String {
    format!("{RECORD_PREFIX}{fqdn}:{value}")
}

fn account_key(username: &str, zone: &str) -> String {
    format!("{ACCOUNT_PREFIX}{username}:{zone}")
}

#[derive(Serialize, Deserialize)]
struct StoredAccount {
    username: String,
    password: String,
    zone: String,
    allowfrom: CidrList,
}

impl StoredAccount {
    fn encode(account: &Account) -> Result<Vec<u8>, Error> {
        Ok(serde_json::to_vec(&StoredAccount {
            username: account.username.clone(),
            password: account.password_digest.clone(),
            zone: account.zone.to_string(),
            allowfrom: account.allowed_ips.clone(),
        })?)
    }

    fn decode(raw: &[u8]) -> Result<Account, Error> {
        let stored: StoredAccount = serde_json::from_slice(raw)?;
        Ok(Account {
            username: stored.username,
            password_digest: stored.password,
            zone: canonical_name(&stored.zone)?,
            allowed_ips: stored.allowfrom,
        })
    }
}

enum Handle {
    ReadWrite(Database),
    ReadOnly(ReadOnlyDatabase),
}

impl Handle {
    fn begin_read(&self) -> Result<ReadTransaction, Error> {
        match self {
            Handle::ReadWrite(db) => db.begin_read().map_err(kv),
            Handle::ReadOnly(db) => db.begin_read().map_err(kv),
        }
    }

    fn begin_write(&self) -> Result<WriteTransaction, Error> {
        match self {
            Handle::ReadWrite(db) => db.begin_write().map_err(kv),
            Handle::ReadOnly(_) => Err(Error::ReadOnly),
        }
    }
}

type SharedHandle = Arc<RwLock<Option<Handle>>>;

struct Compactor {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Collect the keys starting with `prefix`, in key order.
fn scan<T>(table: &T, prefix: &str) -> Result<Vec<String>, Error>
where
    T: ReadableTable<&'static str, &'static [u8]>,
{
    let mut keys = Vec::new();
    for entry in table.range(prefix..).map_err(kv)? {
        let (key, _) = entry.map_err(kv)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        keys.push(key.to_string());
    }
    Ok(keys)
}

#[allow(clippy::module_name_repetitions)]
pub struct RedbStorage {
    db: SharedHandle,
    compactor: Mutex<Option<Compactor>>,
}

impl RedbStorage {
    /// Open the database at `path`. Read-write opens create the database if needed and start
    /// a compaction task running every `gc_interval`, so they must happen within a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Kv`] if the database can't be opened or initialized.
    pub fn open(path: impl AsRef<Path>, read_only: bool, gc_interval: Duration) -> Result<Self, Error> {
        let path = path.as_ref();
        let handle = if read_only {
            Handle::ReadOnly(ReadOnlyDatabase::open(path).map_err(kv)?)
        } else {
            let db = Database::create(path).map_err(kv)?;
            let txn = db.begin_write().map_err(kv)?;
            txn.open_table(KEYS).map_err(kv)?;
            txn.commit().map_err(kv)?;
            Handle::ReadWrite(db)
        };

        let db = Arc::new(RwLock::new(Some(handle)));
        let compactor = (!read_only).then(|| Self::spawn_compactor(Arc::clone(&db), gc_interval));
        tracing::debug!(
            "opened redb storage at {} (read-only: {read_only})",
            path.display()
        );
        Ok(Self {
            db,
            compactor: Mutex::new(compactor),
        })
    }

    fn spawn_compactor(db: SharedHandle, interval: Duration) -> Compactor {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            let mut wait = interval;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    () = tokio::time::sleep(wait) => {}
                }
                let db = Arc::clone(&db);
                wait = match tokio::task::spawn_blocking(move || Self::compact(&db)).await {
                    // Progress was made: go again straight away.
                    Ok(Ok(true)) => Duration::ZERO,
                    Ok(Ok(false)) => interval,
                    Ok(Err(err)) => {
                        tracing::warn!("redb compaction failed: {err}");
                        interval
                    }
                    Err(err) => {
                        tracing::error!("redb compaction task failed: {err}");
                        interval
                    }
                };
            }
        });
        Compactor { stop, task }
    }

    fn compact(db: &RwLock<Option<Handle>>) -> Result<bool, Error> {
        let mut guard = db.blocking_write();
        match guard.as_mut() {
            Some(Handle::ReadWrite(db)) => db.compact().map_err(kv),
            _ => Ok(false),
        }
    }

    /// Run `op` against the open database on the blocking thread pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, Error>
    where
        T: Send + 'static,
        F: FnOnce(&Handle) -> Result<T, Error> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let guard = db.blocking_read();
            let handle = guard.as_ref().ok_or(Error::Closed)?;
            op(handle)
        })
        .await?
    }
}

#[async_trait::async_trait]
impl Storage for RedbStorage {
    async fn get_records(&self, fqdn: &LowerName) -> Result<Vec<String>, Error> {
        let fqdn = fqdn.clone();
        self.blocking(move |handle| {
            let txn = handle.begin_read()?;
            let table = txn.open_table(KEYS).map_err(kv)?;
            let prefix = record_key(&fqdn, "");
            let values: Vec<String> = scan(&table, &prefix)?
                .into_iter()
                .map(|key| key[prefix.len()..].to_string())
                .collect();
            if values.is_empty() {
                return Err(Error::RecordNotFound(fqdn));
            }
            Ok(values)
        })
        .await
    }

    async fn present_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        let key = record_key(fqdn, value);
        self.blocking(move |handle| {
            let txn = handle.begin_write()?;
            {
                let mut table = txn.open_table(KEYS).map_err(kv)?;
                table.insert(key.as_str(), EMPTY).map_err(kv)?;
            }
            txn.commit().map_err(kv)
        })
        .await
    }

    async fn cleanup_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        let fqdn = fqdn.clone();
        let value = value.to_string();
        self.blocking(move |handle| {
            let txn = handle.begin_write()?;
            {
                let mut table = txn.open_table(KEYS).map_err(kv)?;
                let removed = table
                    .remove(record_key(&fqdn, &value).as_str())
                    .map_err(kv)?
                    .is_some();
                if !removed && !scan(&table, &record_key(&fqdn, ""))?.is_empty() {
                    return Err(Error::ValueNotFound { fqdn, value });
                }
            }
            txn.commit().map_err(kv)
        })
        .await
    }

    async fn register_account(&self, account: &Account) -> Result<(), Error> {
        let account = account.clone();
        self.blocking(move |handle| {
            let key = account_key(&account.username, &account.zone.to_string());
            let txn = handle.begin_write()?;
            {
                let mut table = txn.open_table(KEYS).map_err(kv)?;
                if table.get(key.as_str()).map_err(kv)?.is_some() {
                    return Err(Error::AccountExists {
                        username: account.username,
                        zone: account.zone,
                    });
                }
                let blob = StoredAccount::encode(&account)?;
                table.insert(key.as_str(), blob.as_slice()).map_err(kv)?;
            }
            txn.commit().map_err(kv)
        })
        .await
    }

    async fn get_account(&self, username: &str, name: &LowerName) -> Result<Account, Error> {
        let username = username.to_string();
        let name = name.clone();
        self.blocking(move |handle| {
            let txn = handle.begin_read()?;
            let table = txn.open_table(KEYS).map_err(kv)?;
            let name_str = name.to_string();

            if let Some(blob) = table.get(account_key(&username, &name_str).as_str()).map_err(kv)? {
                return StoredAccount::decode(blob.value());
            }

            // A single key lookup can't find a parent zone: scan all of the user's accounts.
            let prefix = account_key(&username, "");
            let best = scan(&table, &prefix)?
                .into_iter()
                .filter(|key| zone_contains(&key[prefix.len()..], &name_str))
                .max_by_key(|key| key.len());
            let Some(best) = best else {
                return Err(Error::AccountNotFound { username, name });
            };

            match table.get(best.as_str()).map_err(kv)? {
                Some(blob) => StoredAccount::decode(blob.value()),
                None => Err(Error::AccountNotFound { username, name }),
            }
        })
        .await
    }

    async fn close(&self) -> Result<(), Error> {
        if let Some(compactor) = self.compactor.lock().await.take() {
            // The task also exits if the receiver sees the sender dropped.
            let _ = compactor.stop.send(());
            compactor.task.await?;
        }
        self.db.write().await.take();
        Ok(())
    }
}
