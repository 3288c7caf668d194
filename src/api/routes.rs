use crate::api::api_error::APIError;
use crate::api::auth::{authorize, Authorized};
use crate::api::model::{RecordResponse, RegisterRequest, RegisterResponse};
use crate::api::server::AppState;
use crate::cidr::CidrList;
use crate::error::Error;
use crate::metrics::CONTENT_TYPE;
use crate::storage::Account;
use crate::zones::canonical_name;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::header::CONTENT_TYPE as CONTENT_TYPE_HEADER;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/register", post(register))
        .route("/present", post(present))
        .route("/cleanup", post(cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    state.metrics.inc_api("health");
    Json(json!({"ok":"healthy"}))
}

#[allow(clippy::unused_async)]
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, APIError> {
    let body = state.metrics.render().map_err(|err| {
        error!("rendering metrics failed: {err}");
        APIError::MetricsFailed
    })?;
    Ok(([(CONTENT_TYPE_HEADER, CONTENT_TYPE)], body))
}

async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterResponse>), APIError> {
    state.metrics.inc_api("register");
    if !state.config.enable_registration {
        return Err(APIError::RegistrationDisabled);
    }
    if body.is_empty() {
        warn!("rejected registration: no body");
        return Err(APIError::NoRegistrationRequest);
    }
    let request: RegisterRequest = serde_json::from_slice(&body).map_err(|err| {
        warn!("rejected registration: {err}");
        APIError::MalformedJSON
    })?;
    if request.username.is_empty() || request.password.is_empty() || request.zone.is_empty() {
        warn!("rejected registration: missing required fields");
        return Err(APIError::MissingRequiredFields);
    }

    let zone = canonical_name(&request.zone)
        .ok()
        .filter(|zone| state.config.zones().matches(zone).is_some())
        .ok_or_else(|| {
            warn!("rejected registration: invalid zone {:?}", request.zone);
            APIError::InvalidZone
        })?;
    let allowed_ips = CidrList::parse(request.allowfrom.as_deref().unwrap_or_default())
        .map_err(|err| {
            warn!("rejected registration: {err}");
            APIError::InvalidAllowfromCidr
        })?;

    let hasher = state.hasher;
    let password = request.password;
    let password_digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(Error::from)
        .and_then(|digest| digest)
        .map_err(|err| {
            error!("hashing password for \"{}\" failed: {err}", request.username);
            APIError::RegistrationFailed
        })?;

    let account = Account {
        username: request.username,
        password_digest,
        zone,
        allowed_ips,
    };
    match state.storage.register_account(&account).await {
        Ok(()) => {}
        Err(err @ Error::AccountExists { .. }) => {
            warn!("rejected registration: {err}");
            return Err(APIError::AccountExists);
        }
        Err(Error::ReadOnly) => return Err(APIError::ReadOnly),
        Err(err) => {
            error!("registering \"{}\" failed: {err}", account.username);
            return Err(APIError::RegistrationFailed);
        }
    }

    info!(
        "registered account \"{}\" for \"{}\"",
        account.username, account.zone
    );
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Account registered successfully",
            username: account.username,
            zone: account.zone.to_string(),
        }),
    ))
}

async fn present(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RecordResponse>, APIError> {
    state.metrics.inc_api("present");
    let Authorized { account, record } = authorize(&state, peer, &headers, &body).await?;

    match state.storage.present_record(&record.fqdn, &record.value).await {
        Ok(()) => {
            info!(
                "presented \"{}\" for \"{}\" ({})",
                record.value,
                record.fqdn,
                account_label(account.as_ref())
            );
            Ok(Json(record.into()))
        }
        Err(Error::ReadOnly) => Err(APIError::ReadOnly),
        Err(err) => {
            error!("present for \"{}\" failed: {err}", record.fqdn);
            Err(APIError::PresentFailed)
        }
    }
}

async fn cleanup(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RecordResponse>, APIError> {
    state.metrics.inc_api("cleanup");
    let Authorized { account, record } = authorize(&state, peer, &headers, &body).await?;

    match state.storage.cleanup_record(&record.fqdn, &record.value).await {
        Ok(()) | Err(Error::ValueNotFound { .. }) => {
            info!(
                "cleaned up \"{}\" for \"{}\" ({})",
                record.value,
                record.fqdn,
                account_label(account.as_ref())
            );
            Ok(Json(record.into()))
        }
        Err(Error::ReadOnly) => Err(APIError::ReadOnly),
        Err(err) => {
            error!("cleanup for \"{}\" failed: {err}", record.fqdn);
            Err(APIError::CleanupFailed)
        }
    }
}

fn account_label(account: Option<&Account>) -> String {
    account.map_or_else(
        || "unauthenticated".to_string(),
        |account| format!("account \"{}\" for \"{}\"", account.username, account.zone),
    )
}
