//! Configuration passed explicitly into the client and page controller.
//!
//! Nothing in this crate reads environment variables. The daemon fills these
//! structs from its command line (with env fallbacks) and hands them down.

use serde::{Deserialize, Serialize};

use crate::types::ModelSelector;

/// Default OpenCode server address.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:4096";

/// Working directory used when a call does not name one.
pub const DEFAULT_DIRECTORY: &str = "/workspace";

/// Title given to sessions created without one.
pub const DEFAULT_SESSION_TITLE: &str = "New Session";

pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_AGENT: &str = "build";
pub const DEFAULT_MESSAGE_LIMIT: usize = 100;

/// Where the OpenCode server lives and which tree it works on by default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub base_url: String,
    pub directory: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            directory: directory.into(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL, DEFAULT_DIRECTORY)
    }
}

/// Fixed selections used by the page controller's write path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDefaults {
    pub model: ModelSelector,
    pub agent: String,
    /// Upper bound on history fetched per page load.
    pub message_limit: usize,
}

impl Default for ChatDefaults {
    fn default() -> Self {
        Self {
            model: ModelSelector::new(DEFAULT_PROVIDER, DEFAULT_MODEL),
            agent: DEFAULT_AGENT.to_string(),
            message_limit: DEFAULT_MESSAGE_LIMIT,
        }
    }
}
