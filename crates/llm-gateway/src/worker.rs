//! Worker pool executor loop and per-request state machine.
//!
//! Each worker loops on `MessageQueue::dequeue`, drives one request through
//! `DEQUEUED -> SESSION_PREP -> INFERENCE_WAIT -> INFERENCE_ACTIVE ->
//! INFERENCE_DONE -> SESSION_FINALIZE -> REPLY_PUBLISH`, and publishes
//! exactly one reply per request regardless of which stage it fails at.

use async_trait::async_trait;
use gateway_core::{
    GatewayError, GenParams, GenerationBackend, MessageQueue, ProjectRegistry, Reply, Request,
    SessionRegistry,
};
use gateway_core::session::Phase1Outcome;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};

/// Publishes a reply to an MQTT topic. Abstracted so the worker pool can
/// be exercised without a live broker.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError>;
}

pub struct WorkerConfig {
    pub request_ttl: Duration,
    pub max_history_tokens: usize,
    pub max_requests_per_window: u32,
    pub window_duration: Duration,
}

/// Shared, immutable-after-construction state every worker draws on.
pub struct WorkerContext {
    pub queue: Arc<MessageQueue>,
    pub sessions: Arc<SessionRegistry>,
    pub slots: Arc<gateway_core::InferenceSlots>,
    pub backend: Arc<dyn GenerationBackend>,
    pub projects: Arc<ProjectRegistry>,
    pub stats: Arc<gateway_core::Stats>,
    pub publisher: Arc<dyn ReplyPublisher>,
    pub config: WorkerConfig,
}

/// Runs one worker's dequeue loop until `shutdown` fires. On shutdown the
/// worker stops pulling new requests but does not abandon one already
/// in flight; the controller bounds total drain time separately.
pub async fn run_worker(id: usize, ctx: Arc<WorkerContext>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let request = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
                continue;
            }
            req = ctx.queue.dequeue() => req,
        };

        process_request(&ctx, request).await;
        let _ = id;
    }
}

/// Drives a single request through the full state machine and publishes its
/// reply exactly once.
async fn process_request(ctx: &WorkerContext, request: Request) {
    ctx.stats.record_request();
    let start = Instant::now();

    let outcome = drive(ctx, &request).await;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    let reply = match outcome {
        Ok(text) => Reply::success(request.request_id.clone(), text, elapsed_ms),
        Err(err) => {
            ctx.stats.record_error();
            warn!(
                project = %request.project_name,
                session_id = %request.session_id,
                kind = %err.kind(),
                "request failed"
            );
            Reply::error(request.request_id.clone(), err.kind(), err.to_string(), elapsed_ms)
        }
    };

    publish_reply(ctx, &request.reply_topic, &reply).await;
}

async fn drive(ctx: &WorkerContext, request: &Request) -> Result<String, GatewayError> {
    let project = ctx
        .projects
        .lookup(&request.project_name)
        .ok_or_else(|| GatewayError::Internal(format!("unknown project {}", request.project_name)))?;

    let deadline = request.enqueued_at + ctx.config.request_ttl;
    if Instant::now() >= deadline {
        return Err(GatewayError::Timeout);
    }

    // SESSION_PREP (Phase 1): composes the prompt under the session lock,
    // without holding it across any of the I/O below.
    let session = ctx.sessions.get_or_create(&request.project_name, &request.session_id).await;
    let system_prompt = request.custom_system_prompt.as_deref().unwrap_or(&project.system_prompt);
    let params = project.default_gen_params.with_overrides(
        request.temperature,
        request.top_p,
        request.max_tokens,
    );

    let (messages, params) = match ctx
        .sessions
        .phase1(
            &session,
            system_prompt,
            &request.user_message,
            params,
            ctx.config.max_requests_per_window,
            ctx.config.window_duration,
        )
        .await
    {
        Phase1Outcome::RateLimited => return Err(GatewayError::RateLimited),
        Phase1Outcome::Ready { messages, params } => (messages, params),
    };

    // INFERENCE_WAIT: acquire a slot, bounded by the remaining deadline so a
    // saturated backend cannot pin a request past its TTL while queued for a
    // permit.
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(GatewayError::Timeout);
    }
    let permit = match tokio::time::timeout(remaining, ctx.slots.acquire()).await {
        Ok(permit) => permit,
        Err(_) => return Err(GatewayError::Timeout),
    };

    // INFERENCE_ACTIVE: the only stage that performs network I/O against the
    // backend; no session lock is held here.
    let remaining = deadline.saturating_duration_since(Instant::now());
    let inference_start = Instant::now();
    let result = ctx.backend.generate(&messages, params, remaining).await;
    ctx.stats.record_inference(inference_start.elapsed());

    // INFERENCE_DONE: the permit drops here, before SESSION_FINALIZE.
    drop(permit);

    let assistant_text = result?;

    // SESSION_FINALIZE (Phase 2).
    ctx.sessions.phase2(&session, &assistant_text, ctx.config.max_history_tokens).await;

    Ok(assistant_text)
}

async fn publish_reply(ctx: &WorkerContext, topic: &str, reply: &Reply) {
    let payload = match serde_json::to_vec(&reply.to_json()) {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(%err, "failed to serialize reply payload");
            return;
        }
    };

    if let Err(err) = ctx.publisher.publish(topic, payload).await {
        ctx.stats.record_error();
        warn!(%topic, %err, "failed to publish reply");
    } else {
        info!(%topic, request_id = ?reply.request_id, "reply published");
    }
}
