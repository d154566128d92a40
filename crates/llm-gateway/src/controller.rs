//! Startup ordering, background task supervision, and graceful shutdown.

use crate::config::Args;
use crate::mqtt::{self, MqttConfig, MqttPublisher};
use crate::worker::{self, WorkerConfig, WorkerContext};
use gateway_core::{HttpBackend, MessageQueue, ProjectRegistry, SessionRegistry, Stats};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Distinguishes a startup failure (exit code 1) from an unrecoverable
/// runtime fault (exit code 2).
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("startup failed: {0}")]
    Startup(#[from] anyhow::Error),
    #[error("runtime fault: {0}")]
    Runtime(String),
}

impl RunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunError::Startup(_) => 1,
            RunError::Runtime(_) => 2,
        }
    }
}

/// Runs the gateway to completion: builds every component in dependency
/// order, starts the background reaper and stats loggers, starts the worker
/// pool, connects to the broker, and blocks until a shutdown signal arrives.
pub async fn run(args: Args) -> Result<(), RunError> {
    let projects = crate::config::load_projects(&args.config, args.default_gen_params())?;
    info!(count = projects.len(), "loaded project configuration");
    let projects = Arc::new(ProjectRegistry::new(projects));

    if args.num_workers <= args.inference_slots {
        tracing::warn!(
            num_workers = args.num_workers,
            inference_slots = args.inference_slots,
            "num_workers should exceed inference_slots so the queue keeps draining while the \
             backend is saturated (workers then block on the slot semaphore, not each other)"
        );
    }

    let backend = Arc::new(HttpBackend::new(args.backend_url.clone()));
    let sessions = Arc::new(SessionRegistry::new(args.max_concurrent_sessions));
    let slots = gateway_core::new_inference_slots(args.inference_slots);
    let queue = Arc::new(MessageQueue::new(args.queue_capacity()));
    let stats = Arc::new(Stats::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let reaper_handle = spawn_reaper(sessions.clone(), args.session_timeout(), args.reaper_interval(), shutdown_rx.clone());
    let stats_handle = spawn_stats_logger(stats.clone(), args.stats_interval(), shutdown_rx.clone());

    let mqtt_config = MqttConfig {
        host: args.mqtt_host.clone(),
        port: args.mqtt_port,
        username: args.mqtt_username.clone(),
        password: args.mqtt_password.clone(),
    };
    let (client, eventloop) = mqtt::connect(&mqtt_config, &projects);
    let publisher = Arc::new(MqttPublisher::new(client.clone()));

    let worker_ctx = Arc::new(WorkerContext {
        queue: queue.clone(),
        sessions: sessions.clone(),
        slots,
        backend,
        projects: projects.clone(),
        stats: stats.clone(),
        publisher,
        config: WorkerConfig {
            request_ttl: args.request_ttl(),
            max_history_tokens: args.max_history_tokens,
            max_requests_per_window: args.max_requests_per_window,
            window_duration: args.window_duration(),
        },
    });

    let mut worker_handles = Vec::with_capacity(args.num_workers);
    for id in 0..args.num_workers {
        let ctx = worker_ctx.clone();
        let rx = shutdown_rx.clone();
        worker_handles.push(tokio::spawn(async move { worker::run_worker(id, ctx, rx).await }));
    }

    let ingress_handle = tokio::spawn(mqtt::run_ingress(
        eventloop,
        client,
        queue.clone(),
        projects.clone(),
        stats.clone(),
        shutdown_rx.clone(),
    ));

    info!(
        num_workers = args.num_workers,
        inference_slots = args.inference_slots,
        queue_capacity = args.queue_capacity(),
        "gateway started"
    );

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| RunError::Runtime(format!("failed to listen for shutdown signal: {e}")))?;
    info!("shutdown signal received, draining in-flight work");

    let _ = shutdown_tx.send(true);

    let drain = async {
        for handle in worker_handles {
            let _ = handle.await;
        }
        let _ = ingress_handle.await;
        let _ = reaper_handle.await;
        let _ = stats_handle.await;
    };

    if tokio::time::timeout(args.shutdown_deadline(), drain).await.is_err() {
        tracing::warn!("shutdown deadline exceeded, forcing exit");
    }

    info!("gateway stopped");
    Ok(())
}

fn spawn_reaper(
    sessions: Arc<SessionRegistry>,
    session_timeout: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let removed = sessions.reap_idle(session_timeout).await;
                    if removed > 0 {
                        info!(removed, "reaped idle sessions");
                    }
                }
            }
        }
    })
}

fn spawn_stats_logger(
    stats: Arc<Stats>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let snap = stats.snapshot();
                    info!(
                        requests_total = snap.requests_total,
                        errors_total = snap.errors_total,
                        avg_latency_ms = snap.avg_latency_ms,
                        inference_count = snap.inference_count,
                        "stats"
                    );
                }
            }
        }
    })
}
