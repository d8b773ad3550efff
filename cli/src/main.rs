//! Procurement CLI - watch workflow events and sign from the terminal

mod client;
mod messages;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::messages::{describe_event, EntityKind, ServerMessage, SignTarget};

#[derive(Parser)]
#[command(name = "procurement-cli")]
#[command(about = "CLI client for the procurement workflow server")]
#[command(version)]
struct Cli {
    /// Server stream URL
    #[arg(short, long, env = "PROCUREMENT_SERVER", default_value = "ws://localhost:3000/ws")]
    server: String,

    /// Your user id
    #[arg(short, long, env = "PROCUREMENT_USER")]
    user: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print workflow events as they happen
    Watch {
        /// Only show these entity kinds (repeatable)
        #[arg(short, long = "kind", value_enum)]
        kinds: Vec<EntityKind>,

        /// Exit after this many events
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Sign a request or protocol
    Sign {
        #[arg(value_enum)]
        target: SignTarget,

        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procurement_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Watch { kinds, limit } => run_watch(&cli.server, cli.user, kinds, limit).await,
        Commands::Sign { target, id } => run_sign(&cli.server, cli.user, target, id).await,
    }
}

async fn run_watch(
    server: &str,
    user: Option<Uuid>,
    kinds: Vec<EntityKind>,
    limit: Option<usize>,
) -> Result<()> {
    let mut client = client::ProcurementClient::connect(server, user).await?;
    if !kinds.is_empty() {
        client.subscribe(kinds).await?;
    }

    println!("Listening for events...");
    let mut seen = 0;
    client
        .listen(|msg| {
            match msg {
                ServerMessage::Event { event, .. } => {
                    println!(
                        "[{}] {}",
                        chrono::Local::now().format("%H:%M:%S"),
                        describe_event(&event)
                    );
                    seen += 1;
                    if limit.is_some_and(|limit| seen >= limit) {
                        return false;
                    }
                }
                ServerMessage::Lagged { skipped } => {
                    eprintln!("(missed {} events)", skipped);
                }
                ServerMessage::Error { message } => eprintln!("error: {}", message),
                _ => {}
            }
            true
        })
        .await
}

async fn run_sign(server: &str, user: Option<Uuid>, target: SignTarget, id: Uuid) -> Result<()> {
    let user = user.ok_or_else(|| anyhow!("--user is required to sign"))?;
    let mut client = client::ProcurementClient::connect(server, Some(user)).await?;

    if let ServerMessage::Signed {
        newly_signed,
        quorum_complete,
        ..
    } = client.sign(target, id).await?
    {
        match (newly_signed, quorum_complete) {
            (false, _) => println!("Already signed {}", id),
            (true, true) => println!("Signed {}. All signatures collected.", id),
            (true, false) => println!("Signed {}. Waiting for other signers.", id),
        }
    }

    Ok(())
}
