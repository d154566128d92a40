//! Core session, concurrency, and dispatch engine for the LLM inference
//! gateway: routing, bounded history, prompt composition, and the
//! worker/semaphore concurrency primitives. MQTT ingress/egress and the CLI
//! live in the `llm-gateway` binary crate, which is built on top of this
//! library.

pub mod composer;
pub mod domain;
pub mod error;
pub mod inference;
pub mod project;
pub mod queue;
pub mod session;
pub mod slots;
pub mod stats;
pub mod trimmer;

pub use domain::{GenParams, Message, MessageRole, Project, Reply, Request, Role, Turn};
pub use error::{ErrorKind, GatewayError, Result};
pub use inference::{GenerationBackend, HttpBackend};
pub use project::ProjectRegistry;
pub use queue::MessageQueue;
pub use session::{Session, SessionRegistry};
pub use slots::{new_shared as new_inference_slots, InferenceSlots};
pub use stats::Stats;
