//! Command line and environment configuration.
//!
//! Every connection flag has an environment fallback so the relay can be
//! configured entirely from a container's env.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use chatrelay_core::config::{
    DEFAULT_AGENT, DEFAULT_BASE_URL, DEFAULT_DIRECTORY, DEFAULT_MESSAGE_LIMIT, DEFAULT_MODEL,
    DEFAULT_PROVIDER,
};
use chatrelay_core::subscription::ReconnectPolicy;
use chatrelay_core::types::ModelSelector;
use chatrelay_core::{ChatDefaults, ClientConfig};
use chatrelay_http::RelayOptions;

/// Web chat relay for an OpenCode server.
#[derive(Parser, Debug)]
#[command(name = "chatrelay", version, about)]
pub struct Cli {
    /// Base URL of the OpenCode server.
    #[arg(long, env = "OPENCODE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub opencode_url: String,

    /// Working directory used when a request names none.
    #[arg(long, env = "OPENCODE_DIRECTORY", default_value = DEFAULT_DIRECTORY, global = true)]
    pub directory: String,

    #[arg(long, env = "CHATRELAY_PROVIDER", default_value = DEFAULT_PROVIDER, global = true)]
    pub provider: String,

    #[arg(long, env = "CHATRELAY_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub model: String,

    /// Agent that handles sent messages.
    #[arg(long, env = "CHATRELAY_AGENT", default_value = DEFAULT_AGENT, global = true)]
    pub agent: String,

    /// Most messages fetched when loading a session.
    #[arg(long, env = "CHATRELAY_MESSAGE_LIMIT", default_value_t = DEFAULT_MESSAGE_LIMIT, global = true)]
    pub message_limit: usize,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the HTTP relay.
    Serve(ServeArgs),
    /// List sessions.
    Sessions,
    /// List agents.
    Agents,
    /// Create a session.
    Create {
        /// Session title; a placeholder is used when omitted.
        title: Option<String>,
    },
    /// Send a message to a session and print the reply.
    Send {
        session: String,
        /// Message text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Cancel a session's in-flight generation.
    Abort { session: String },
    /// Follow a session's live events until interrupted.
    Watch { session: String },
}

#[derive(Args, Debug, PartialEq)]
pub struct ServeArgs {
    #[arg(long, env = "CHATRELAY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, env = "CHATRELAY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Serve files from this directory for paths the API does not handle.
    #[arg(long)]
    pub static_dir: Option<PathBuf>,

    /// Write raw upstream event frames here, one file per directory.
    #[arg(long)]
    pub transcript_dir: Option<PathBuf>,

    /// Reconnect attempts for a lost upstream event stream (0 = never).
    #[arg(long, default_value_t = 5)]
    pub max_reconnects: u32,
}

impl Cli {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig::new(
            self.opencode_url.trim_end_matches('/'),
            self.directory.as_str(),
        )
    }

    pub fn chat_defaults(&self) -> ChatDefaults {
        ChatDefaults {
            model: ModelSelector::new(self.provider.as_str(), self.model.as_str()),
            agent: self.agent.clone(),
            message_limit: self.message_limit,
        }
    }
}

impl ServeArgs {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            reconnect: ReconnectPolicy {
                max_attempts: self.max_reconnects,
                initial_delay: Duration::from_millis(500),
                max_delay: Duration::from_secs(30),
            },
            transcript_dir: self.transcript_dir.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("chatrelay").chain(args.iter().copied())).unwrap()
    }

    mod parsing {
        use super::*;

        #[test]
        fn defaults() {
            let cli = parse(&["sessions"]);
            assert_eq!(cli.command, Command::Sessions);
            assert_eq!(cli.client_config(), ClientConfig::default());
            assert_eq!(cli.chat_defaults(), ChatDefaults::default());
        }

        #[test]
        fn global_flags_after_subcommand() {
            let cli = parse(&[
                "agents",
                "--opencode-url",
                "http://10.0.0.2:4096/",
                "--directory",
                "/repo",
            ]);
            let config = cli.client_config();
            assert_eq!(config.base_url, "http://10.0.0.2:4096");
            assert_eq!(config.directory, "/repo");
        }

        #[test]
        fn model_selection() {
            let cli = parse(&[
                "--provider",
                "openai",
                "--model",
                "gpt-5",
                "--agent",
                "plan",
                "--message-limit",
                "20",
                "sessions",
            ]);
            let defaults = cli.chat_defaults();
            assert_eq!(defaults.model, ModelSelector::new("openai", "gpt-5"));
            assert_eq!(defaults.agent, "plan");
            assert_eq!(defaults.message_limit, 20);
        }

        #[test]
        fn send_joins_words() {
            let cli = parse(&["send", "s1", "fix", "the", "build"]);
            match cli.command {
                Command::Send { session, text } => {
                    assert_eq!(session, "s1");
                    assert_eq!(text.join(" "), "fix the build");
                }
                other => panic!("Expected send, got {:?}", other),
            }
        }

        #[test]
        fn send_requires_text() {
            assert!(Cli::try_parse_from(["chatrelay", "send", "s1"]).is_err());
        }

        #[test]
        fn create_title_is_optional() {
            assert_eq!(parse(&["create"]).command, Command::Create { title: None });
        }

        #[test]
        fn missing_subcommand_is_an_error() {
            assert!(Cli::try_parse_from(["chatrelay"]).is_err());
        }
    }

    mod serve {
        use super::*;

        #[test]
        fn defaults() {
            let cli = parse(&["serve"]);
            let Command::Serve(args) = cli.command else {
                panic!("Expected serve");
            };
            assert_eq!(args.addr(), "127.0.0.1:8080");
            let options = args.relay_options();
            assert_eq!(options.reconnect, ReconnectPolicy::default());
            assert!(options.transcript_dir.is_none());
        }

        #[test]
        fn options() {
            let cli = parse(&[
                "serve",
                "--host",
                "0.0.0.0",
                "--port",
                "9000",
                "--static-dir",
                "web/dist",
                "--transcript-dir",
                "/tmp/frames",
                "--max-reconnects",
                "0",
            ]);
            let Command::Serve(args) = cli.command else {
                panic!("Expected serve");
            };
            assert_eq!(args.addr(), "0.0.0.0:9000");
            assert_eq!(args.static_dir, Some(PathBuf::from("web/dist")));
            let options = args.relay_options();
            assert_eq!(options.reconnect.max_attempts, 0);
            assert_eq!(options.transcript_dir, Some(PathBuf::from("/tmp/frames")));
        }
    }
}
