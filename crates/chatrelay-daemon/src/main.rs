//! chatrelay: serve the chat relay, or talk to OpenCode from the shell.

mod cli;
mod output;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use thiserror::Error;

use chatrelay_core::controller::{self, ActionForm, ActionOutcome};
use chatrelay_core::subscription::SubscriptionOptions;
use chatrelay_core::view::ChatView;
use chatrelay_core::{ChatDefaults, ClientError, OpenCodeClient};
use chatrelay_http::SharedState;

use cli::{Cli, Command, ServeArgs};

#[derive(Error, Debug)]
enum DaemonError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Action(String),
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), DaemonError> {
    let client = OpenCodeClient::new(cli.client_config());
    let defaults = cli.chat_defaults();

    match cli.command {
        Command::Serve(args) => serve(client, defaults, args),
        Command::Sessions => {
            println!("{}", output::sessions(&client.list_sessions(None)?));
            Ok(())
        }
        Command::Agents => {
            println!("{}", output::agents(&client.list_agents(None)?));
            Ok(())
        }
        Command::Create { title } => {
            let form = ActionForm {
                intent: "create-session".to_string(),
                title,
                ..ActionForm::default()
            };
            if let ActionOutcome::SessionCreated { session } = act(&client, &defaults, form)? {
                println!("{}\t{}", session.id, session.title);
            }
            Ok(())
        }
        Command::Send { session, text } => {
            let form = ActionForm {
                intent: "send-message".to_string(),
                session_id: Some(session),
                text: Some(text.join(" ")),
                ..ActionForm::default()
            };
            if let ActionOutcome::MessageSent { message } = act(&client, &defaults, form)? {
                println!("{}", output::message(&message));
            }
            Ok(())
        }
        Command::Abort { session } => {
            let form = ActionForm {
                intent: "abort".to_string(),
                session_id: Some(session),
                ..ActionForm::default()
            };
            act(&client, &defaults, form)?;
            Ok(())
        }
        Command::Watch { session } => watch(client, defaults, &session),
    }
}

/// Run one write-path action, turning a failure result into an error.
fn act(
    client: &OpenCodeClient,
    defaults: &ChatDefaults,
    form: ActionForm,
) -> Result<ActionOutcome, DaemonError> {
    let result = controller::act(client, defaults, &form);
    match (result.success, result.data) {
        (true, Some(data)) => Ok(data),
        _ => Err(DaemonError::Action(
            result.error.unwrap_or_else(|| "Action failed".to_string()),
        )),
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, DaemonError> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn serve(client: OpenCodeClient, defaults: ChatDefaults, args: ServeArgs) -> Result<(), DaemonError> {
    let state = Arc::new(SharedState::new(client, defaults, args.relay_options()));

    runtime()?.block_on(async move {
        let listener = tokio::net::TcpListener::bind(args.addr()).await?;
        chatrelay_http::serve(listener, state, args.static_dir, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
        Ok::<(), DaemonError>(())
    })
}

fn watch(client: OpenCodeClient, defaults: ChatDefaults, session: &str) -> Result<(), DaemonError> {
    let history = client.list_messages(session, defaults.message_limit, None)?;
    if let Some(last) = history.last() {
        println!("{}", output::message(last));
    }

    let mut view = ChatView::new(client, SubscriptionOptions::default())
        .on_change(|state| println!("{}", output::latest(state)));
    view.open(session, history, None)?;
    log::info!("Watching {} (Ctrl-C to stop)", session);

    runtime()?.block_on(tokio::signal::ctrl_c())?;
    view.close();
    Ok(())
}
