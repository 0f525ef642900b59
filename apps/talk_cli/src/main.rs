use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{
    ClientState, ControllerConfig, DeleteOutcome, DraftField, HttpTalkApi, StoreAction,
    SubmitOutcome, SyncController,
};
use shared::{domain::ClientId, domain::TalkId, protocol::Talk};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing_subscriber::EnvFilter;

const HELP: &str = "commands:
  set <name|description|speakerName|speakerBio> <value>
  submit
  delete <id>
  list
  errors
  quit";

#[derive(Parser, Debug)]
#[command(about = "Browse and submit talks, with live updates from other clients")]
struct Args {
    #[arg(long, env = "TALKS_SERVER_URL", default_value = "http://127.0.0.1:8443")]
    server_url: String,
}

enum Command {
    Set(DraftField, String),
    Submit,
    Delete(TalkId),
    List,
    Errors,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
    let command = match verb {
        "set" => {
            let (field, value) = rest
                .split_once(' ')
                .map(|(f, v)| (f, v.to_string()))
                .unwrap_or((rest, String::new()));
            let field = field.parse::<DraftField>().map_err(anyhow::Error::msg)?;
            Command::Set(field, value)
        }
        "submit" => Command::Submit,
        "delete" => {
            let id = rest
                .trim()
                .parse::<i64>()
                .with_context(|| format!("invalid talk id '{rest}'"))?;
            Command::Delete(TalkId(id))
        }
        "list" | "" => Command::List,
        "errors" => Command::Errors,
        "help" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => bail!("unknown command '{other}', try 'help'"),
    };
    Ok(command)
}

fn describe(talk: &Talk) -> String {
    let id = talk
        .id
        .map(|id| id.to_string())
        .unwrap_or_else(|| "pending".to_string());
    format!(
        "[{id}] {} by {} ({}): {}",
        talk.name, talk.speaker_name, talk.speaker_bio, talk.description
    )
}

fn print_talks(state: &ClientState) {
    if state.talks.is_empty() {
        println!("no talks yet");
    }
    for talk in state.talks.iter() {
        println!("{}", describe(talk));
    }
    let pending = state.pending_talks().count();
    if pending > 0 {
        println!("{pending} awaiting confirmation");
    }
}

fn spawn_live_printer(controller: &Arc<SyncController>) {
    let mut dispatches = controller.subscribe();
    let own = controller.client_id();
    tokio::spawn(async move {
        loop {
            match dispatches.recv().await {
                Ok(dispatch) => {
                    if let StoreAction::AddTalk { talk } = &dispatch.action {
                        if talk.client_id != Some(own) {
                            println!("+ {}", describe(talk));
                        }
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "cli: missed store updates");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();
    let args = Args::parse();

    let client_id = ClientId::new();
    let api = HttpTalkApi::new(args.server_url).context("invalid --server-url")?;
    let controller = SyncController::new(ControllerConfig { client_id }, Arc::new(api));
    tracing::info!(%client_id, "cli: starting");

    controller.start().await;
    print_talks(&controller.state());
    spawn_live_printer(&controller);
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        match command {
            Command::Set(field, value) => {
                controller.set_input(field, value);
            }
            Command::Submit => match controller.submit().await {
                SubmitOutcome::Rejected => println!("all four fields are required"),
                SubmitOutcome::Confirmed(talk) => println!("created {}", describe(&talk)),
                SubmitOutcome::RolledBack(err) => println!("create failed: {err}"),
            },
            Command::Delete(id) => match controller.delete(id).await {
                DeleteOutcome::Removed => println!("deleted {id}"),
                DeleteOutcome::Kept(err) => println!("delete failed: {err}"),
            },
            Command::List => print_talks(&controller.state()),
            Command::Errors => {
                for error in controller.state().errors.iter() {
                    println!("{} {}: {}", error.at.to_rfc3339(), error.operation, error.message);
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    controller.shutdown();
    Ok(())
}
