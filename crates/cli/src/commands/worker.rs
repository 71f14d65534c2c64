//! `forgeloop worker` — run the worker loop until interrupted.
//!
//! Wires the queue, the default plugin registry, the configured planner,
//! and the engine together, then polls until Ctrl-C. The stop signal is
//! honored between tasks: an in-flight task finishes (or times out)
//! before the process exits cleanly.

use forgeloop_config::AppConfig;
use forgeloop_core::planner::Planner;
use forgeloop_engine::Engine;
use forgeloop_providers::OpenAiCompatPlanner;
use forgeloop_queue::TaskQueue;
use forgeloop_worker::Worker;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let queue = Arc::new(TaskQueue::open(&config.queue.path).await?);

    let (registry, load_errors) = forgeloop_plugins::default_registry();
    for error in &load_errors {
        warn!(error = %error, "Capability provider failed to load");
    }

    let planner: Arc<dyn Planner> = Arc::new(
        OpenAiCompatPlanner::new(
            &config.planner.api_url,
            config.planner.api_key.clone().unwrap_or_default(),
            &config.planner.model,
        )
        .with_temperature(config.planner.temperature),
    );

    let engine = Arc::new(Engine::new(Arc::new(registry), planner));
    let worker = Worker::new(
        queue,
        engine,
        config.worker.poll_interval(),
        config.worker.task_timeout(),
    );

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop signal received, finishing current task");
            let _ = stop_tx.send(true);
        }
    });

    worker.run(stop_rx).await;
    Ok(())
}
