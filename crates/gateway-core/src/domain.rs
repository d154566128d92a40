//! Core domain types: projects, dialog turns, requests, and replies.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Generation parameters applied to a backend call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub enable_thinking: bool,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
            enable_thinking: false,
        }
    }
}

impl GenParams {
    /// Applies per-request overrides from an inbound frame on top of the
    /// project's defaults.
    pub fn with_overrides(
        mut self,
        temperature: Option<f32>,
        top_p: Option<f32>,
        max_tokens: Option<u32>,
    ) -> Self {
        if let Some(t) = temperature {
            self.temperature = t;
        }
        if let Some(p) = top_p {
            self.top_p = p;
        }
        if let Some(m) = max_tokens {
            self.max_tokens = m;
        }
        self
    }
}

/// A project: a named logical tenant with its own topics, system prompt, and
/// default generation parameters. Immutable after load.
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub system_prompt: String,
    pub input_topic: String,
    pub reply_topic_template: String,
    pub default_gen_params: GenParams,
}

impl Project {
    /// Synthesizes the default reply topic for a session from this project's
    /// template, replacing the `{sessionId}` placeholder.
    pub fn default_reply_topic(&self, session_id: &str) -> String {
        self.reply_topic_template
            .replace("{sessionId}", session_id)
    }
}

/// One (role, content) element of a session's stored dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat message as sent to the inference backend, which — unlike a stored
/// `Turn` — may also carry the `system` role.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// An accepted MQTT request, constructed on ingress and discarded after its
/// reply is published.
#[derive(Debug, Clone)]
pub struct Request {
    pub project_name: String,
    pub session_id: String,
    pub user_message: String,
    pub reply_topic: String,
    pub request_id: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub custom_system_prompt: Option<String>,
    pub enqueued_at: Instant,
    pub priority: i32,
}

/// The outcome of processing a `Request`, published exactly once to its
/// `reply_topic`.
#[derive(Debug, Clone)]
pub struct Reply {
    pub request_id: Option<String>,
    pub response_text: Option<String>,
    pub error: Option<(crate::error::ErrorKind, String)>,
    pub latency_ms: u64,
}

impl Reply {
    pub fn success(request_id: Option<String>, response_text: String, latency_ms: u64) -> Self {
        Self {
            request_id,
            response_text: Some(response_text),
            error: None,
            latency_ms,
        }
    }

    pub fn error(
        request_id: Option<String>,
        kind: crate::error::ErrorKind,
        detail: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            request_id,
            response_text: None,
            error: Some((kind, detail.into())),
            latency_ms,
        }
    }

    /// Renders the JSON body published on the reply topic.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.error {
            None => serde_json::json!({
                "response": self.response_text.clone().unwrap_or_default(),
                "requestId": self.request_id,
                "latencyMs": self.latency_ms,
            }),
            Some((kind, detail)) => serde_json::json!({
                "error": kind.to_string(),
                "detail": detail,
                "requestId": self.request_id,
            }),
        }
    }
}
