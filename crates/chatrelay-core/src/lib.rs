//! # chatrelay-core
//!
//! Core logic for chatrelay, a web chat relay in front of an OpenCode server.
//!
//! This crate is transport-agnostic and can be used by:
//! - the HTTP relay (via `chatrelay-http`)
//! - the command line (via `chatrelay-daemon`)
//!
//! ## Key Concepts
//!
//! - **Session**: A conversation thread owned by the OpenCode server
//! - **ChatEvent**: One decoded frame from the server's event stream
//! - **ChatState**: The chat view's reconciled transcript, folded from
//!   history plus events by [`reducer::reduce`]

pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod event_bus;
pub mod events;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod reducer;
pub mod sse;
pub mod subscription;
pub mod transcript;
pub mod transport;
pub mod types;
pub mod view;

// Re-export commonly used types
pub use client::OpenCodeClient;
pub use config::{ChatDefaults, ClientConfig};
pub use error::ClientError;
pub use events::ChatEvent;
pub use reducer::{reduce, ChatState};
pub use types::{MessageWithParts, Part, Session, SessionStatus};
