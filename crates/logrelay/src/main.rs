#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, path::PathBuf, sync::Arc};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use logrelay_agent::{server, Config, DispatchEngine, Ingestor, OrphanReclaimer, WriterRegistry};
use logrelay_queue::{LogQueue, MemoryQueue};

const DEFAULT_CONFIG_PATH: &str = "./config/logrelay.yaml";

#[tokio::main]
pub async fn main() {
    let log_level = env::var("LOGRELAY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .without_time()
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config_path = env::var("LOGRELAY_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration from [{}]: {e}", config_path.display());
            return;
        }
    };

    let queue: Arc<dyn LogQueue> = Arc::new(MemoryQueue::new());
    let ingestor = Ingestor::new(Arc::clone(&queue));

    let registry = match WriterRegistry::from_config(&config.log, &ingestor).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Error building log writers: {e}");
            return;
        }
    };
    info!("initialized {} log writer(s)", registry.len());

    let cancel = CancellationToken::new();

    let listener_handles =
        match server::start(&config.server, ingestor.clone(), cancel.clone()).await {
            Ok(handles) => handles,
            Err(e) => {
                error!("Error starting listeners: {e}");
                return;
            }
        };
    if listener_handles.is_empty() {
        warn!("no listener enabled; only locally enqueued messages will be dispatched");
    }

    let engine = Arc::new(DispatchEngine::new(
        Arc::clone(&queue),
        Arc::clone(&registry),
        &ingestor,
        config.max_write_threads(),
        cancel.clone(),
    ));
    let engine_handle = tokio::spawn(Arc::clone(&engine).run());

    let reclaimer = OrphanReclaimer::new(Arc::clone(&queue), cancel.clone());
    let reclaimer_handle = tokio::spawn(reclaimer.run());

    info!("logrelay started");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Error waiting for shutdown signal: {e}");
    }
    info!("shutdown signal received");
    cancel.cancel();

    let _ = engine_handle.await;
    let _ = reclaimer_handle.await;
    for handle in listener_handles {
        let _ = handle.await;
    }

    // Let in-flight deliveries resolve their leases before the writers go.
    engine.quiesce().await;
    registry.shutdown().await;
    info!(
        "logrelay stopped after {} successful deliveries",
        engine.success_total()
    );
}
