//! An SQLite implementation of the [`Storage`][super::Storage] trait.
//!
//! Writes go through a pool capped at one connection, so mutations are serialized. Reads use a
//! separate pool of `max(4, CPUs)` connections. A read-only open creates only the read pool,
//! with connections opened `SQLITE_OPEN_READONLY`.
//!
//! ```text
//! records  (fqdn, value, updated, created)          PRIMARY KEY (fqdn, value)
//! accounts (username, password, zone, allowfrom, created)  PRIMARY KEY (username, zone)
//! ```

use crate::cidr::CidrList;
use crate::error::Error;
use crate::storage::{Account, Storage};
use crate::zones::canonical_name;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use trust_dns_server::client::rr::LowerName;

#[allow(clippy::module_name_repetitions)]
pub struct SqliteStorage {
    write_pool: Option<SqlitePool>,
    read_pool: SqlitePool,
}

impl SqliteStorage {
    /// Open the database at `path`, creating it and its tables unless `read_only` is set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sql`] if the database can't be opened or the tables can't be created.
    pub async fn open(path: impl AsRef<Path>, read_only: bool) -> Result<Self, Error> {
        let path = path.as_ref();
        let options = SqliteConnectOptions::new()
            .filename(path)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::from_secs(5));

        let write_pool = if read_only {
            None
        } else {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .connect_with(options.clone().create_if_missing(true))
                .await?;
            Self::create_tables(&pool).await?;
            Some(pool)
        };

        #[allow(clippy::cast_possible_truncation)]
        let readers = num_cpus::get().max(4) as u32;
        let read_pool = SqlitePoolOptions::new()
            .max_connections(readers)
            .connect_with(options.read_only(read_only))
            .await?;

        tracing::debug!(
            "opened SQLite storage at {} (read-only: {read_only})",
            path.display()
        );
        Ok(Self {
            write_pool,
            read_pool,
        })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS records (
                fqdn TEXT NOT NULL,
                value TEXT NOT NULL,
                updated TIMESTAMP NOT NULL,
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (fqdn, value)
            );
            ",
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS accounts (
                username TEXT NOT NULL,
                password TEXT NOT NULL,
                zone TEXT NOT NULL,
                allowfrom TEXT,
                created TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (username, zone)
            );
            ",
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    fn reader(&self) -> Result<&SqlitePool, Error> {
        if self.read_pool.is_closed() {
            return Err(Error::Closed);
        }
        Ok(&self.read_pool)
    }

    fn writer(&self) -> Result<&SqlitePool, Error> {
        match &self.write_pool {
            None => Err(Error::ReadOnly),
            Some(pool) if pool.is_closed() => Err(Error::Closed),
            Some(pool) => Ok(pool),
        }
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn get_records(&self, fqdn: &LowerName) -> Result<Vec<String>, Error> {
        let values: Vec<String> = sqlx::query_scalar(
            "SELECT value FROM records WHERE fqdn = ? ORDER BY updated DESC, rowid DESC",
        )
        .bind(fqdn.to_string())
        .fetch_all(self.reader()?)
        .await?;

        if values.is_empty() {
            return Err(Error::RecordNotFound(fqdn.clone()));
        }
        Ok(values)
    }

    async fn present_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        // Replacing the row also renews its rowid, which orders values presented within the
        // same millisecond.
        sqlx::query(
            "INSERT OR REPLACE INTO records (fqdn, value, updated) \
             VALUES (?, ?, strftime('%Y-%m-%d %H:%M:%f', 'now'))",
        )
        .bind(fqdn.to_string())
        .bind(value)
        .execute(self.writer()?)
        .await?;
        Ok(())
    }

    async fn cleanup_record(&self, fqdn: &LowerName, value: &str) -> Result<(), Error> {
        let writer = self.writer()?;
        let deleted = sqlx::query("DELETE FROM records WHERE fqdn = ? AND value = ?")
            .bind(fqdn.to_string())
            .bind(value)
            .execute(writer)
            .await?
            .rows_affected();
        if deleted > 0 {
            return Ok(());
        }

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE fqdn = ?")
            .bind(fqdn.to_string())
            .fetch_one(writer)
            .await?;
        if remaining > 0 {
            return Err(Error::ValueNotFound {
                fqdn: fqdn.clone(),
                value: value.to_string(),
            });
        }
        Ok(())
    }

    async fn register_account(&self, account: &Account) -> Result<(), Error> {
        sqlx::query("INSERT INTO accounts (username, password, zone, allowfrom) VALUES (?, ?, ?, ?)")
            .bind(&account.username)
            .bind(&account.password_digest)
            .bind(account.zone.to_string())
            .bind(account.allowed_ips.to_string())
            .execute(self.writer()?)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::AccountExists {
                        username: account.username.clone(),
                        zone: account.zone.clone(),
                    }
                }
                other => Error::Sql(other),
            })?;
        Ok(())
    }

    async fn get_account(&self, username: &str, name: &LowerName) -> Result<Account, Error> {
        let name_str = name.to_string();
        // Longest zone that is `name` itself or a parent domain of it.
        let row: Option<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT username, password, zone, allowfrom FROM accounts \
             WHERE username = ? \
               AND (zone = '.' OR zone = ? OR substr(?, -length(zone) - 1) = '.' || zone) \
             ORDER BY length(zone) DESC LIMIT 1",
        )
        .bind(username)
        .bind(&name_str)
        .bind(&name_str)
        .fetch_optional(self.reader()?)
        .await?;

        let Some((username, password_digest, zone, allowfrom)) = row else {
            return Err(Error::AccountNotFound {
                username: username.to_string(),
                name: name.clone(),
            });
        };
        Ok(Account {
            username,
            password_digest,
            zone: canonical_name(&zone)?,
            allowed_ips: CidrList::parse_joined(allowfrom.as_deref().unwrap_or_default())?,
        })
    }

    async fn close(&self) -> Result<(), Error> {
        if let Some(pool) = &self.write_pool {
            pool.close().await;
        }
        self.read_pool.close().await;
        Ok(())
    }
}
