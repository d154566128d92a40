//! Inbound MQTT frame parsing.

use gateway_core::{GatewayError, Project, Request};
use serde::Deserialize;
use std::time::Instant;

#[derive(Debug, Deserialize)]
struct InboundFrame {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
    message: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
    #[serde(rename = "replyTopic")]
    reply_topic: Option<String>,
    #[serde(rename = "systemPrompt")]
    system_prompt: Option<String>,
    temperature: Option<f32>,
    #[serde(rename = "topP")]
    top_p: Option<f32>,
    #[serde(rename = "maxTokens")]
    max_tokens: Option<u32>,
}

/// Parses an inbound MQTT payload into a `Request` for the given project.
/// The standard shape is a camelCase JSON object; an unrecognized
/// structural variant is rejected with `bad_request` rather than silently
/// coerced.
///
/// A plain-text (non-JSON-object) payload falls back to treating the whole
/// payload as `message`, taking `session_id` from the caller-supplied
/// fallback (derived from a topic sub-segment) when present.
pub fn parse_frame(
    payload: &[u8],
    project: &Project,
    fallback_session_id: Option<&str>,
) -> Result<Request, GatewayError> {
    match serde_json::from_slice::<InboundFrame>(payload) {
        Ok(frame) => build_request(frame, project),
        Err(_) => {
            let text = String::from_utf8_lossy(payload).to_string();
            let session_id = fallback_session_id
                .ok_or_else(|| {
                    GatewayError::BadRequest(
                        "plain-text payload carries no session id and none could be inferred from the topic"
                            .to_string(),
                    )
                })?
                .to_string();
            Ok(Request {
                project_name: project.name.clone(),
                session_id: session_id.clone(),
                user_message: text,
                reply_topic: project.default_reply_topic(&session_id),
                request_id: None,
                temperature: None,
                top_p: None,
                max_tokens: None,
                custom_system_prompt: None,
                enqueued_at: Instant::now(),
                priority: 0,
            })
        }
    }
}

fn build_request(frame: InboundFrame, project: &Project) -> Result<Request, GatewayError> {
    let session_id = frame
        .session_id
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing sessionId".to_string()))?;
    let message = frame
        .message
        .filter(|m| !m.is_empty())
        .ok_or_else(|| GatewayError::BadRequest("missing message".to_string()))?;

    let reply_topic = frame
        .reply_topic
        .unwrap_or_else(|| project.default_reply_topic(&session_id));

    Ok(Request {
        project_name: project.name.clone(),
        session_id,
        user_message: message,
        reply_topic,
        request_id: frame.request_id,
        temperature: frame.temperature,
        top_p: frame.top_p,
        max_tokens: frame.max_tokens,
        custom_system_prompt: frame.system_prompt,
        enqueued_at: Instant::now(),
        priority: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_core::GenParams;

    fn project() -> Project {
        Project {
            name: "general".to_string(),
            system_prompt: "SYS".to_string(),
            input_topic: "general/user_input".to_string(),
            reply_topic_template: "general/assistant_response/{sessionId}".to_string(),
            default_gen_params: GenParams::default(),
        }
    }

    #[test]
    fn parses_minimal_frame() {
        let payload = br#"{"sessionId":"s1","message":"hello"}"#;
        let req = parse_frame(payload, &project(), None).unwrap();
        assert_eq!(req.session_id, "s1");
        assert_eq!(req.user_message, "hello");
        assert_eq!(req.reply_topic, "general/assistant_response/s1");
        assert!(req.request_id.is_none());
    }

    #[test]
    fn honors_explicit_reply_topic() {
        let payload = br#"{"sessionId":"s2","message":"q","requestId":"r2","replyTopic":"custom/out/abc"}"#;
        let req = parse_frame(payload, &project(), None).unwrap();
        assert_eq!(req.reply_topic, "custom/out/abc");
        assert_eq!(req.request_id.as_deref(), Some("r2"));
    }

    #[test]
    fn missing_session_id_is_bad_request() {
        let payload = br#"{"message":"hello"}"#;
        let err = parse_frame(payload, &project(), None).unwrap_err();
        assert_eq!(err.kind(), gateway_core::ErrorKind::BadRequest);
    }

    #[test]
    fn missing_message_is_bad_request() {
        let payload = br#"{"sessionId":"s1"}"#;
        let err = parse_frame(payload, &project(), None).unwrap_err();
        assert_eq!(err.kind(), gateway_core::ErrorKind::BadRequest);
    }

    #[test]
    fn plain_text_falls_back_to_topic_session_id() {
        let payload = b"just some text";
        let req = parse_frame(payload, &project(), Some("s3")).unwrap();
        assert_eq!(req.session_id, "s3");
        assert_eq!(req.user_message, "just some text");
    }

    #[test]
    fn plain_text_without_fallback_session_id_is_rejected() {
        let payload = b"just some text";
        let err = parse_frame(payload, &project(), None).unwrap_err();
        assert_eq!(err.kind(), gateway_core::ErrorKind::BadRequest);
    }

    #[test]
    fn custom_system_prompt_is_not_persisted_into_request_dialog_field() {
        let payload = br#"{"sessionId":"s1","message":"hi","systemPrompt":"override"}"#;
        let req = parse_frame(payload, &project(), None).unwrap();
        assert_eq!(req.custom_system_prompt.as_deref(), Some("override"));
    }
}
