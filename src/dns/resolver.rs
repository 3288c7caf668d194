use crate::error::Error;
use crate::storage::DynStorage;
use crate::zones::{is_challenge_name, Fallthrough, Zones};
use trust_dns_server::client::rr::{LowerName, RecordType};

/// What to do with a query.
#[derive(Debug)]
pub enum Resolution {
    /// Answer authoritatively with one TXT record per value.
    Answer(Vec<String>),
    /// The name exists, but has no records of the queried type.
    NoData,
    /// Authoritative NXDOMAIN.
    NameError,
    /// Hand the query, unmodified, to the next handler.
    Forward,
    /// Storage failed; answer SERVFAIL.
    ServerFailure(Error),
}

impl Resolution {
    /// Metric label for the outcome.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Resolution::Answer(_) => "answer",
            Resolution::NoData => "nodata",
            Resolution::NameError => "nxdomain",
            Resolution::Forward => "forward",
            Resolution::ServerFailure(_) => "servfail",
        }
    }
}

/// Decides how to answer queries for challenge names in the configured zones.
///
/// Resolution only reads from storage, so a single resolver serves concurrent queries without
/// any locking of its own.
pub struct Resolver {
    zones: Zones,
    fallthrough: Fallthrough,
    storage: DynStorage,
}

impl Resolver {
    #[must_use]
    pub fn new(zones: Zones, fallthrough: Fallthrough, storage: DynStorage) -> Self {
        Self {
            zones,
            fallthrough,
            storage,
        }
    }

    /// True if `name` is within a configured zone.
    #[must_use]
    pub fn in_zone(&self, name: &LowerName) -> bool {
        self.zones.matches(name).is_some()
    }

    pub async fn resolve(&self, name: &LowerName, query_type: RecordType) -> Resolution {
        if !self.in_zone(name) || !is_challenge_name(name) {
            return Resolution::Forward;
        }
        if !matches!(query_type, RecordType::TXT | RecordType::ANY) {
            return Resolution::NoData;
        }

        match self.storage.get_records(name).await {
            Ok(values) => Resolution::Answer(values),
            Err(err) if err.is_not_found() => {
                tracing::debug!("no records for {name}");
                if self.fallthrough.through(name) {
                    Resolution::Forward
                } else {
                    Resolution::NameError
                }
            }
            Err(err) => Resolution::ServerFailure(err),
        }
    }
}
