use acmetxt::api::AppState;
use acmetxt::dns::StaticHandler;
use acmetxt::error::Error;
use acmetxt::storage::{self, DynStorage};
use acmetxt::{Config, Metrics, SharedConfig};
use anyhow::{anyhow, Result};
use is_terminal::IsTerminal;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_init();

    let mut first_args = std::env::args().take(2);
    let (program_name, config_file) = (
        first_args.next().unwrap_or("acmetxt".to_string()),
        first_args.next(),
    );

    let config = config_init(&program_name, config_file)?;
    let read_only = config.read_only();
    let storage = storage::open(&config.storage, read_only).await?;
    tracing::info!("opened {:?} storage (read-only: {read_only})", config.storage);

    let result = serve(config, storage.clone()).await;
    if let Err(err) = storage.close().await {
        tracing::error!("closing storage failed: {err}");
    }
    tracing::info!("goodbye");
    result
}

async fn serve(config: SharedConfig, storage: DynStorage) -> Result<()> {
    let metrics = Metrics::new()?;

    tracing::info!("DNS listening on UDP {}", &config.dns_udp_bind_addr);
    tracing::info!("DNS listening on TCP {}", &config.dns_tcp_bind_addr);
    let fallback = StaticHandler::from_config(&config)?;
    let dns_server = acmetxt::dns::new(&config, storage.clone(), metrics.clone(), fallback).await?;
    let dns_handle = tokio::spawn(dns_server.block_until_done());

    let api_handle = match config.api_bind_addr {
        Some(api_bind_addr) => {
            storage::register_config_accounts(&config, &storage).await?;
            tracing::info!("API listening on {api_bind_addr}");
            let state = AppState::new(config.clone(), storage.clone(), metrics.clone());
            let api_server = acmetxt::api::new(api_bind_addr, state)?;
            Some(tokio::spawn(api_server))
        }
        None => {
            tracing::info!("API disabled, serving DNS only");
            None
        }
    };
    let api_done = async {
        match api_handle {
            Some(handle) => handle.await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("quitting from signal");
        },
        Ok(dns_res) = dns_handle => {
            if let Err(err) = dns_res {
                return Err(Error::DNSError(err).into())
            }
        }
        Ok(api_res) = api_done => {
            if let Err(err) = api_res {
                return Err(Error::HTTP(err).into())
            }
        }
    }
    Ok(())
}

fn tracing_init() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(std::io::stdout().is_terminal()))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "acmetxt=info".into()),
        )
        .init();
}

fn config_init(program_name: &str, config_file: Option<String>) -> Result<SharedConfig> {
    match config_file {
        None => Err(anyhow!("usage: {program_name} /path/to/config.json")),
        Some(config_file) => {
            let config = Config::try_from_file(&config_file)?;
            tracing::debug!("loaded config from {config_file}");
            Ok(Arc::new(config))
        }
    }
}
