//! Authoritative DNS server for ACME challenge TXT records.
//!
//! # Challenge TXT Records
//!
//! A query is answered from [storage][crate::storage] when its name is within one of the
//! configured [`Config::zones`][`crate::config::Config::zones`] and its first label is
//! `_acme-challenge`. Every other query is forwarded, unmodified, to the next
//! [`RequestHandler`][trust_dns_server::server::RequestHandler] in the chain.
//!
//! E.g. with config:
//! ```json
//! {
//!   "zones": ["example.org"],
//!   ...
//! }
//! ```
//!
//! After an ACME client `POST`s the [`/present` API endpoint][crate::api#present-post] like so:
//!
//! ```bash
//! ❯ curl -u alice:secret --json \
//!   '{"fqdn":"_acme-challenge.example.org","value":"LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"}' \
//!    http://localhost:8080/present
//! {"fqdn":"_acme-challenge.example.org.","value":"LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"}
//! ```
//!
//! A `TXT` query for `_acme-challenge.example.org` returns:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 +short _acme-challenge.example.org TXT
//! "LPsIwTo7o8BoG0-vjCyGQGBWSVIPxI-i_X336eUOQZo"
//! ```
//!
//! Several values may be present for one name at once (e.g. a certificate for both
//! `example.org` and `*.example.org`); each is returned as its own TXT record. `ANY` queries
//! are answered like `TXT`, and other types get an empty authoritative answer.
//!
//! When a challenge name has no values the answer is NXDOMAIN, unless
//! [`Config::fallthrough`][`crate::config::Config::fallthrough`] is set for it, in which case
//! the query is forwarded.
//!
//! # Static Records
//!
//! The standalone server forwards to a [`StaticHandler`] serving records from the
//! [Config][`crate::config::Config`]. Unlike the challenge records, these do not change at
//! runtime and can't be influenced by the [HTTP API][crate::api].
//!
//! ## A/AAAA
//!
//! Served for each FQDN in the [`Config::addrs`][`crate::config::Config::addrs`] map. Only IPv4
//! values will be used for `A` class queries, and IPv6 values for `AAAA`.
//!
//! ## NS
//!
//! Served for each FQDN in the [`Config::ns_records`][`crate::config::Config::ns_records`] map.
//!
//! ## SOA
//!
//! Served at the apex of each zone when both
//! [`Config::ns_domain`][`crate::config::Config::ns_domain`] and
//! [`Config::ns_admin`][`crate::config::Config::ns_admin`] are set:
//!
//! ```bash
//! ❯ dig @127.0.0.1 -p 5353 example.org +short SOA
//! ns1.example.org. dns-admin.example.org. 20230312 86400 7200 3600000 172800
//! ```
//!
//! _Note: The zone serial (`20230312`) will differ based on the date the query is performed._

mod fallback;
mod handlers;
mod resolver;
pub mod server;

pub use fallback::StaticHandler;
pub use handlers::{Handler, TXT_TTL};
pub use resolver::{Resolution, Resolver};
pub use server::new;
