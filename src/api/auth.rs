//! The authentication and authorization pipeline guarding `/present` and `/cleanup`.

use crate::api::api_error::APIError;
use crate::api::model::{valid_dns01, RecordRequest, TxtRecord};
use crate::api::server::AppState;
use crate::cidr::parse_ip;
use crate::password::PasswordHasher;
use crate::storage::Account;
use crate::zones::canonical_name;
use axum::body::Bytes;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::{IpAddr, SocketAddr};
use tracing::{error, warn};

pub const API_USER_HEADER: &str = "X-Api-User";
pub const API_KEY_HEADER: &str = "X-Api-Key";

/// A request that passed the pipeline.
#[derive(Debug, Clone)]
pub struct Authorized {
    /// The account the credentials resolved to. `None` when authentication isn't required.
    pub account: Option<Account>,
    pub record: TxtRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Credentials {
    pub username: String,
    pub password: String,
}

/// Run a record request through the pipeline, stopping at the first failed check:
///
/// 1. the client IP must be within the global allow-list;
/// 2. the body must be a `{"fqdn", "value"}` JSON object;
/// 3. the FQDN must be within a configured zone;
/// 4. the value must look like a DNS-01 challenge response;
/// 5. if authentication is required, the credentials must match the account with the longest
///    zone containing the FQDN, and the client IP must be within that account's allow-list.
///
/// # Errors
///
/// Returns the [`APIError`] of the first failed check.
pub async fn authorize(
    state: &AppState,
    peer: SocketAddr,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Authorized, APIError> {
    let config = &state.config;
    let Some(client_ip) = client_ip(headers, config.extract_ip_from_header.as_deref(), peer)
    else {
        warn!("rejected request from {peer}: no client IP");
        return Err(APIError::ForbiddenIP);
    };
    if !config.allowfrom.contains(client_ip) {
        warn!("rejected request from {client_ip}: not in allowfrom ({})", config.allowfrom);
        return Err(APIError::ForbiddenIP);
    }

    if body.is_empty() {
        warn!("rejected request from {client_ip}: no body");
        return Err(APIError::NoRequestBody);
    }
    let request: RecordRequest = serde_json::from_slice(body).map_err(|err| {
        warn!("rejected request from {client_ip}: {err}");
        APIError::InvalidRequest
    })?;

    let fqdn = canonical_name(&request.fqdn)
        .ok()
        .filter(|fqdn| config.zones().matches(fqdn).is_some())
        .ok_or_else(|| {
            warn!("rejected request from {client_ip}: invalid subdomain {:?}", request.fqdn);
            APIError::InvalidSubdomain
        })?;

    if let Err(err) = valid_dns01(&request.value) {
        warn!("rejected request from {client_ip} for \"{fqdn}\": {err}");
        return Err(APIError::InvalidTxtRecord);
    }

    let record = TxtRecord {
        fqdn,
        value: request.value,
    };
    if !config.require_auth {
        return Ok(Authorized {
            account: None,
            record,
        });
    }

    let account = authenticate(state, headers, &record, client_ip).await?;
    if !account.allowed_ips.contains(client_ip) {
        warn!(
            "rejected request from {client_ip}: not in allowfrom of account \"{}\" ({})",
            account.username, account.allowed_ips
        );
        return Err(APIError::ForbiddenIP);
    }
    Ok(Authorized {
        account: Some(account),
        record,
    })
}

/// Resolve and verify the account for the request's credentials. Every failure is reported as
/// [`APIError::Unauthorized`], so usernames can't be enumerated.
async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    record: &TxtRecord,
    client_ip: IpAddr,
) -> Result<Account, APIError> {
    let fqdn = &record.fqdn;
    let Some(Credentials { username, password }) = credentials(headers) else {
        warn!("rejected request from {client_ip} for \"{fqdn}\": no credentials");
        return Err(APIError::Unauthorized);
    };

    let account = match state.storage.get_account(&username, fqdn).await {
        Ok(account) => account,
        Err(err) if err.is_not_found() => {
            warn!("rejected request from {client_ip} for \"{fqdn}\": {err}");
            return Err(APIError::Unauthorized);
        }
        Err(err) => {
            error!("account lookup for \"{username}\" failed: {err}");
            return Err(APIError::Unauthorized);
        }
    };

    let digest = account.password_digest.clone();
    let verified = tokio::task::spawn_blocking(move || PasswordHasher::verify(&digest, &password))
        .await
        .unwrap_or_else(|err| {
            error!("password verification for \"{username}\" failed: {err}");
            false
        });
    if !verified {
        warn!("rejected request from {client_ip} for \"{fqdn}\": invalid password for \"{username}\"");
        return Err(APIError::Unauthorized);
    }
    Ok(account)
}

/// The client IP: the first non-empty entry of `header` when configured, otherwise the peer
/// address.
pub(super) fn client_ip(headers: &HeaderMap, header: Option<&str>, peer: SocketAddr) -> Option<IpAddr> {
    match header.filter(|name| !name.is_empty()) {
        None => Some(peer.ip()),
        Some(name) => headers
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .map(str::trim)
            .find(|entry| !entry.is_empty())
            .and_then(parse_ip),
    }
}

/// Credentials from HTTP Basic auth, falling back to the `X-Api-User`/`X-Api-Key` headers.
/// An empty username or password counts as none.
pub(super) fn credentials(headers: &HeaderMap) -> Option<Credentials> {
    let (username, password) = basic_auth(headers).unwrap_or_else(|| {
        (
            header_str(headers, API_USER_HEADER).to_string(),
            header_str(headers, API_KEY_HEADER).to_string(),
        )
    });
    if username.is_empty() || password.is_empty() {
        return None;
    }
    Some(Credentials { username, password })
}

fn basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
