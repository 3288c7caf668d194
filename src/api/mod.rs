//! HTTP API for managing challenge TXT records and the accounts allowed to change them.
//!
//! Enabled by setting [`Config::api_bind_addr`][`crate::config::Config::api_bind_addr`].
//! Every error response is HTTP 4xx/5xx with a JSON body of the form `{"error": "<code>"}`;
//! see [`APIError`] for the codes.
//!
//! # API Endpoints
//!
//! ## `/health` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/metrics` (GET)
//!
//!   Returns the request counters in the Prometheus text exposition format.
//!
//! ## `/register` (POST)
//!
//!   Returns HTTP 501 (Not Implemented) unless
//!   [`Config::enable_registration`][`crate::config::Config::enable_registration`] is set.
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "username": "alice", "password": "secret", "zone": "example.org", "allowfrom": ["10.0.0.0/8"] }
//!   ```
//!
//!   `zone` must be within one of the configured zones. `allowfrom` is optional; when present
//!   the account can only be used from those IPs and networks. A `(username, zone)` pair can
//!   only be registered once (HTTP 409, `account_exists`).
//!
//!   Returns HTTP 201 (Created):
//!
//!   ```json
//!   { "message": "Account registered successfully", "username": "alice", "zone": "example.org." }
//!   ```
//!
//! ## `/present` (POST)
//!
//!   Expects a JSON request body of the form:
//!
//!   ```json
//!   { "fqdn": "_acme-challenge.example.org", "value": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!   ```
//!
//!  The `value` must be a valid [RFC-8555][RFC-8555] [DNS-01] challenge response. It is added to
//!  the values served for `fqdn`; presenting a value twice is harmless.
//!
//!  Returns HTTP 200 (OK), echoing the canonical FQDN and the value:
//!
//!  ```json
//!  { "fqdn": "_acme-challenge.example.org.", "value": "XXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXXX" }
//!  ```
//!
//! ## `/cleanup` (POST)
//!
//!  Same request and response as `/present`, removing the value instead. Removing a value that
//!  isn't present succeeds.
//!
//! # Authentication
//!
//! `/present` and `/cleanup` requests pass through [`authorize`] before touching storage:
//!
//! * The client IP must be within [`Config::allowfrom`][`crate::config::Config::allowfrom`]
//!   (empty allows all). Behind a proxy the IP is taken from the first entry of
//!   [`Config::extract_ip_from_header`][`crate::config::Config::extract_ip_from_header`].
//! * With [`Config::require_auth`][`crate::config::Config::require_auth`] set, credentials are
//!   read from HTTP Basic auth, or the `X-Api-User` and `X-Api-Key` headers. They are checked
//!   against the account of that user with the longest zone containing `fqdn`, and the client
//!   IP must also be within the account's own `allowfrom`.
//!
//! Wrong usernames, wrong passwords and missing credentials are all reported as
//! `unauthorized`.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

mod api_error;
mod auth;
mod model;
mod routes;
pub mod server;

pub use api_error::APIError;
pub use auth::{authorize, Authorized, API_KEY_HEADER, API_USER_HEADER};
pub use model::{valid_dns01, TxtRecord, TxtValidationError, TXT_LENGTH};
pub use server::{new, router, AppState};
