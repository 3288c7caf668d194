//! An in-memory implementation of the [`Storage`][super::Storage] trait.
//!
//! Not durable across restarts. Values are returned most-recently-presented first.

use crate::error::Error;
use crate::storage::{longest_zone_match, Account, Storage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use trust_dns_server::client::rr::LowerName;

#[derive(Default, Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct MemoryStorage {
    txt_records: RwLock<HashMap<LowerName, VecDeque<String>>>,
    // Keyed by "username:zone".
    accounts: RwLock<HashMap<String, Account>>,
    read_only: bool,
    closed: AtomicBool,
}

impl MemoryStorage {
    #[must_use]
    pub fn new(read_only: bool) -> Self {
        Self {
            read_only,
            ..Self::default()
        }
    }

    fn account_key(username: &str, zone: &LowerName) -> String {
        format!("{username}:{zone}")
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<(), Error> {
        self.check_open()?;
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Storage for MemoryStorage {
    async fn get_records(&self, fqdn: &LowerName) -> Result<Vec<String>, Error> {
        self.check_open()?;
        match self.txt_records.read().await.get(fqdn) {
            Some(values) if !values.is_empty() => Ok(values.iter().cloned().collect()),
            _ => Err(Error::RecordNotFound(fqdn.clone())),
        }
    }

    async fn present_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        self.check_writable()?;
        let mut records = self.txt_records.write().await;
        let values = records.entry(fqdn.clone()).or_default();
        if !values.iter().any(|existing| existing == value) {
            values.push_front(value.to_string());
        }
        Ok(())
    }

    async fn cleanup_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        self.check_writable()?;
        let mut records = self.txt_records.write().await;
        let Some(values) = records.get_mut(fqdn) else {
            return Ok(());
        };
        let Some(position) = values.iter().position(|existing| existing == value) else {
            return Err(Error::ValueNotFound {
                fqdn: fqdn.clone(),
                value: value.to_string(),
            });
        };
        values.remove(position);
        if values.is_empty() {
            records.remove(fqdn);
        }
        Ok(())
    }

    async fn register_account(&self, account: &Account) -> Result<(), Error> {
        self.check_writable()?;
        let key = Self::account_key(&account.username, &account.zone);
        let mut accounts = self.accounts.write().await;
        if accounts.contains_key(&key) {
            return Err(Error::AccountExists {
                username: account.username.clone(),
                zone: account.zone.clone(),
            });
        }
        accounts.insert(key, account.clone());
        Ok(())
    }

    async fn get_account(&self, username: &str, name: &LowerName) -> Result<Account, Error> {
        self.check_open()?;
        let accounts = self.accounts.read().await;
        if let Some(account) = accounts.get(&Self::account_key(username, name)) {
            return Ok(account.clone());
        }

        let candidates = accounts
            .values()
            .filter(|account| account.username == username)
            .cloned();
        longest_zone_match(candidates, &name.to_string()).ok_or_else(|| Error::AccountNotFound {
            username: username.to_string(),
            name: name.clone(),
        })
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        self.txt_records.write().await.clear();
        self.accounts.write().await.clear();
        Ok(())
    }
}
