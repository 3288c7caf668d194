use crate::api::routes;
use crate::config::SharedConfig;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::password::PasswordHasher;
use crate::storage::DynStorage;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;

/// Everything the API handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub storage: DynStorage,
    pub metrics: Metrics,
    pub hasher: PasswordHasher,
}

impl AppState {
    #[must_use]
    pub fn new(config: SharedConfig, storage: DynStorage, metrics: Metrics) -> Self {
        let hasher = PasswordHasher::new(config.password_cost);
        AppState {
            config,
            storage,
            metrics,
            hasher,
        }
    }
}

/// The API routes. Handlers need [`ConnectInfo<SocketAddr>`][axum::extract::ConnectInfo].
pub fn router(state: AppState) -> Router {
    routes::new(state)
}

/// Bind `addr` and serve the API on it.
///
/// # Errors
///
/// Returns [`Error::HTTP`] if `addr` can't be bound.
pub fn new(
    addr: SocketAddr,
    state: AppState,
) -> Result<impl Future<Output = hyper::Result<()>>, Error> {
    Ok(axum::Server::try_bind(&addr)?
        .serve(router(state).into_make_service_with_connect_info::<SocketAddr>()))
}
