//! RemitRail service binary
//!
//! Wires configuration, the store, the four source adapters, the engine,
//! the sync scheduler, and the HTTP API into one process.

use recon_api::{app, AppState};
use recon_core::EngineConfig;
use recon_engine::{ReconEngine, Scheduler, Sources};
use recon_matcher::AliasTable;
use recon_store::Store;
use source_adapters::email::{EmailAdapter, HttpEmailTransport};
use source_adapters::inbound::{InboundFundingAdapter, InboundTransport};
use source_adapters::invoice::{HttpInvoiceBackend, InvoiceAdapter};
use source_adapters::outbound::{OutboundPaymentAdapter, OutboundTransport};
use source_adapters::processor::{HttpProcessorClient, ProcessorConfig};
use source_adapters::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let config = EngineConfig::from_env()?;
    info!("starting remitrail (db: {})", config.db_path);

    let store = Store::open(&config.db_path, config.db_connect_timeout).await?;

    let aliases = match &config.agency_aliases_json {
        Some(json) => AliasTable::from_json(json)?,
        None => AliasTable::empty(),
    };

    let sources = build_sources(&config)?;
    let engine = Arc::new(ReconEngine::new(store.clone(), &config, aliases, sources));
    let scheduler = Arc::new(Scheduler::new(engine.clone(), config.sync_interval));

    tokio::spawn(scheduler.clone().start());

    let state = AppState {
        store,
        engine,
        scheduler,
    };

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!("listening on {}", config.bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn build_sources(config: &EngineConfig) -> anyhow::Result<Sources> {
    let http_retry = retry_policy(config.api_max_retries);
    let db_retry = retry_policy(config.db_max_retries);

    let email_transport = Arc::new(HttpEmailTransport::new(
        config.email_relay_url.clone(),
        config.api_timeout,
    )?);
    let invoice_backend = Arc::new(HttpInvoiceBackend::new(
        config.ops_db_url.clone(),
        config.db_connect_timeout,
    )?);
    let processor = Arc::new(HttpProcessorClient::new(ProcessorConfig {
        base_url: config.processor_api_url.clone(),
        api_key: config.processor_api_key.clone(),
        timeout: config.api_timeout,
    })?);

    Ok(Sources {
        email: EmailAdapter::new(
            email_transport,
            config.email_sources.clone(),
            http_retry.clone(),
        ),
        invoice: InvoiceAdapter::new(invoice_backend, db_retry),
        inbound: InboundFundingAdapter::new(
            processor.clone() as Arc<dyn InboundTransport>,
            http_retry.clone(),
        ),
        outbound: OutboundPaymentAdapter::new(
            processor as Arc<dyn OutboundTransport>,
            http_retry,
        ),
    })
}

fn retry_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_secs(1),
        factor: 2.0,
        deadline: None,
    }
}
