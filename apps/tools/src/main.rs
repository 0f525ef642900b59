use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::{domain::TalkId, protocol::NewTalk};
use storage::Storage;

#[derive(Parser, Debug)]
#[command(about = "Maintain the talk database directly, bypassing the server")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/talks.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List,
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: String,
        #[arg(long)]
        speaker_name: String,
        #[arg(long)]
        speaker_bio: String,
    },
    Delete {
        talk_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::List => {
            for talk in storage.list_talks().await? {
                println!(
                    "{}\t{}\t{}\t{}",
                    talk.talk_id,
                    talk.created_at.to_rfc3339(),
                    talk.name,
                    talk.speaker_name
                );
            }
        }
        Command::Create {
            name,
            description,
            speaker_name,
            speaker_bio,
        } => {
            let talk = NewTalk {
                name,
                description,
                speaker_name,
                speaker_bio,
                client_id: None,
            };
            if let Some(field) = talk.first_empty_field() {
                bail!("{field} must not be empty");
            }
            let stored = storage.insert_talk(&talk).await?;
            println!("created talk_id={}", stored.talk_id);
        }
        Command::Delete { talk_id } => {
            if !storage.delete_talk(TalkId(talk_id)).await? {
                bail!("talk {talk_id} not found");
            }
            println!("deleted talk_id={talk_id}");
        }
    }

    Ok(())
}
