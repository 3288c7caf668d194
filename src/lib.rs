//! acmetxt
//!
//! An authoritative DNS server for [RFC-8555][RFC-8555] [DNS-01] challenge TXT records, with an
//! authenticated HTTP API for ACME clients to present and clean up challenge responses.
//!
//! Works with any DNS hosting provider that supports delegating the `_acme-challenge` names of
//! a zone (via NS or CNAME records) to this server. Accounts are scoped to zones: a client can
//! only change records within the zones its account was registered for.
//!
//! Challenge records and accounts are kept in one of three interchangeable
//! [storage engines][storage]: in memory, SQLite or redb.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod api;
pub mod cidr;
pub mod config;
pub mod dns;
pub mod error;
pub mod metrics;
pub mod password;
pub mod storage;
pub mod zones;

pub use api::new as new_http;
pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use error::Error;
pub use metrics::Metrics;
pub use storage::{DynStorage, MemoryStorage, RedbStorage, SqliteStorage, Storage};
