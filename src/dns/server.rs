use crate::config::Config;
use crate::dns::handlers::Handler;
use crate::dns::resolver::Resolver;
use crate::error::Error;
use crate::metrics::Metrics;
use crate::storage::DynStorage;
use tokio::net::{TcpListener, UdpSocket};
use trust_dns_server::server::RequestHandler;
use trust_dns_server::ServerFuture;

/// Build the challenge [`Handler`] for `config`, forwarding to `next`.
pub fn handler<N: RequestHandler>(
    config: &Config,
    storage: DynStorage,
    metrics: Metrics,
    next: N,
) -> Handler<N> {
    let resolver = Resolver::new(config.zones(), config.fallthrough(), storage);
    Handler::new(resolver, next, metrics)
}

/// Bind the UDP and TCP listeners and serve the challenge [`Handler`] on them.
///
/// # Errors
///
/// Returns [`Error::IO`] if a listener can't be bound.
pub async fn new<N: RequestHandler>(
    config: &Config,
    storage: DynStorage,
    metrics: Metrics,
    next: N,
) -> Result<ServerFuture<Handler<N>>, Error> {
    let udp_addr = config.dns_udp_bind_addr;
    let tcp_addr = config.dns_tcp_bind_addr;
    let tcp_timeout = config.dns_tcp_timeout;
    let dns_handler = handler(config, storage, metrics, next);
    let mut dns_server = ServerFuture::new(dns_handler);
    dns_server.register_socket(UdpSocket::bind(udp_addr).await?);
    dns_server.register_listener(TcpListener::bind(tcp_addr).await?, tcp_timeout);
    Ok(dns_server)
}
