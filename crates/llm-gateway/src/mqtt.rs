//! MQTT ingress and egress: subscribes each enabled project's input topic,
//! turns inbound payloads into `Request`s via `frame::parse_frame`, and
//! publishes replies back out. Follows a parse-validate-dispatch-respond
//! handler shape over an MQTT transport, using `rumqttc` as the tokio-native
//! client.

use crate::frame;
use async_trait::async_trait;
use gateway_core::{GatewayError, MessageQueue, Project, ProjectRegistry, Reply, Stats};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

use crate::worker::ReplyPublisher;

pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// `ReplyPublisher` implementation backed by a live `rumqttc::AsyncClient`
/// (egress side of the reply path).
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReplyPublisher for MqttPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| GatewayError::PublishFailed(e.to_string()))
    }
}

/// Builds the `rumqttc` client/event-loop pair. Subscriptions are issued by
/// `run_ingress` on every `ConnAck` (including the first), so the same path
/// handles the initial connect and any later reconnect.
pub fn connect(config: &MqttConfig, _projects: &ProjectRegistry) -> (AsyncClient, EventLoop) {
    let client_id = format!("llm-gateway-{}", Uuid::new_v4());
    let mut opts = MqttOptions::new(client_id, config.host.clone(), config.port);
    opts.set_keep_alive(Duration::from_secs(30));
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        opts.set_credentials(user.clone(), pass.clone());
    }

    AsyncClient::new(opts, 128)
}

const RECONNECT_MIN_BACKOFF: Duration = Duration::from_millis(250);
const RECONNECT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Drives the MQTT event loop: every inbound publish is parsed against its
/// owning project and handed to `try_enqueue`; overflow is rejected
/// synchronously with a `backpressure` error reply so ingress itself never
/// blocks.
///
/// On disconnect, reconnects with exponential backoff bounded by
/// `RECONNECT_MAX_BACKOFF`; subscriptions are re-issued once the broker
/// reports the connection back up, since `rumqttc` does not persist them
/// across a dropped session on its own.
pub async fn run_ingress(
    mut eventloop: EventLoop,
    client: AsyncClient,
    queue: Arc<MessageQueue>,
    projects: Arc<ProjectRegistry>,
    stats: Arc<Stats>,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    let topics: Vec<String> = projects.iter().map(|p| p.input_topic.clone()).collect();
    let mut backoff = RECONNECT_MIN_BACKOFF;

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
            event = eventloop.poll() => {
                match event {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff = RECONNECT_MIN_BACKOFF;
                        resubscribe(&client, &topics);
                    }
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        handle_publish(&publish.topic, &publish.payload, &client, &queue, &projects, &stats).await;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, backoff_ms = backoff.as_millis() as u64, "mqtt connection error, retrying");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                    }
                }
            }
        }
    }
}

/// Doubles the reconnect backoff, bounded by `RECONNECT_MAX_BACKOFF`.
fn next_backoff(current: Duration) -> Duration {
    (current * 2).min(RECONNECT_MAX_BACKOFF)
}

fn resubscribe(client: &AsyncClient, topics: &[String]) {
    let client = client.clone();
    let topics = topics.to_vec();
    tokio::spawn(async move {
        for topic in topics {
            if let Err(err) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                error!(%topic, %err, "failed to resubscribe to project input topic after reconnect");
            }
        }
    });
}

async fn handle_publish(
    topic: &str,
    payload: &[u8],
    client: &AsyncClient,
    queue: &MessageQueue,
    projects: &ProjectRegistry,
    stats: &Stats,
) {
    let project = match find_project_for_topic(projects, topic) {
        Some(p) => p,
        None => {
            warn!(%topic, "publish on topic with no owning project, dropping");
            return;
        }
    };

    // The project's input topic is a single fixed topic (`P.input_topic`),
    // not parameterized per session, so no sub-segment of it ever carries a
    // session id. A plain-text payload on this topic always lacks one.
    let request = match frame::parse_frame(payload, project, None) {
        Ok(req) => req,
        Err(err) => {
            warn!(%topic, %err, "rejecting malformed frame");
            stats.record_error();
            publish_reply_best_effort(client, &project.default_reply_topic("unknown"), &Reply::error(None, err.kind(), err.to_string(), 0)).await;
            return;
        }
    };

    let reply_topic = request.reply_topic.clone();
    let request_id = request.request_id.clone();
    if let Err(_rejected) = queue.try_enqueue(request) {
        stats.record_error();
        let reply = Reply::error(request_id, gateway_core::ErrorKind::Backpressure, "queue at capacity", 0);
        publish_reply_best_effort(client, &reply_topic, &reply).await;
    }
}

fn find_project_for_topic<'a>(projects: &'a ProjectRegistry, topic: &str) -> Option<&'a Project> {
    projects.iter().find(|p| p.input_topic == topic)
}

async fn publish_reply_best_effort(client: &AsyncClient, topic: &str, reply: &Reply) {
    let Ok(payload) = serde_json::to_vec(&reply.to_json()) else {
        return;
    };
    if let Err(err) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
        error!(%topic, %err, "failed to publish backpressure/rejection reply");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::GenParams;

    fn project(name: &str) -> Project {
        Project {
            name: name.to_string(),
            system_prompt: "SYS".to_string(),
            input_topic: format!("{name}/user_input"),
            reply_topic_template: format!("{name}/assistant_response/{{sessionId}}"),
            default_gen_params: GenParams::default(),
        }
    }

    #[test]
    fn finds_project_owning_a_topic() {
        let registry = ProjectRegistry::new(vec![project("general"), project("maze")]);
        let found = find_project_for_topic(&registry, "maze/user_input").unwrap();
        assert_eq!(found.name, "maze");
    }

    #[test]
    fn returns_none_for_unowned_topic() {
        let registry = ProjectRegistry::new(vec![project("general")]);
        assert!(find_project_for_topic(&registry, "unknown/user_input").is_none());
    }

    #[test]
    fn backoff_doubles_up_to_the_configured_ceiling() {
        let mut backoff = RECONNECT_MIN_BACKOFF;
        for _ in 0..20 {
            backoff = next_backoff(backoff);
            assert!(backoff <= RECONNECT_MAX_BACKOFF);
        }
        assert_eq!(backoff, RECONNECT_MAX_BACKOFF);
    }

    #[tokio::test]
    async fn plain_text_on_the_standard_input_topic_is_dropped_not_misrouted() {
        // The input topic carries no session sub-segment, so a plain-text
        // payload here must be rejected rather than accepted under a bogus
        // session id derived from the topic's last path element.
        let registry = ProjectRegistry::new(vec![project("general")]);
        let queue = Arc::new(MessageQueue::new(10));
        let stats = Arc::new(Stats::new());
        let (client, _eventloop) = {
            let mut opts = MqttOptions::new("test-client", "localhost", 1883);
            opts.set_keep_alive(Duration::from_secs(30));
            AsyncClient::new(opts, 128)
        };

        handle_publish(
            "general/user_input",
            b"just some text",
            &client,
            &queue,
            &registry,
            &stats,
        )
        .await;

        assert_eq!(stats.snapshot().errors_total, 1);
    }
}
