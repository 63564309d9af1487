//! CLI binary for aceint.

use aceint::animator::FacialAnimator;
use aceint::avatar::{AvatarLoader, AvatarScene};
use aceint::clock::{Clock, SystemClock};
use aceint::pipeline::messages::UserCommand;
use aceint::response::{GeminiClient, ResponseClient};
use aceint::speech::{ConsoleBridge, ConsoleMicrophone, speech_channel};
use aceint::view::StatusPanel;
use aceint::{AvatarConfig, ConversationCoordinator, RuntimeEvent};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Aceint: talk to a 3D avatar.
#[derive(Parser)]
#[command(name = "aceint", version, about)]
struct Cli {
    /// Path to TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Hold a conversation. Typed lines stand in for speech.
    Chat,

    /// List the meshes and blend shapes of an avatar asset.
    Inspect {
        /// URL or path of a GLB file.
        source: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is the conversation.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("aceint=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => AvatarConfig::from_file(path)?,
        None => {
            let path = AvatarConfig::default_config_path();
            if path.exists() {
                AvatarConfig::from_file(&path)?
            } else {
                AvatarConfig::default()
            }
        }
    };

    match cli.command.unwrap_or(Command::Chat) {
        Command::Chat => run_chat(config).await,
        Command::Inspect { source } => inspect(&source).await,
    }
}

async fn run_chat(config: AvatarConfig) -> anyhow::Result<()> {
    println!("Aceint v{}", env!("CARGO_PKG_VERSION"));

    let mut loader = AvatarLoader::new()?;
    let scene = match loader.load(&config.avatar.source).await {
        Ok(scene) => scene,
        Err(e) => {
            warn!("avatar unavailable, continuing without a face: {e}");
            AvatarScene::new().into_shared()
        }
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let animator = FacialAnimator::new(scene, &config.avatar, &config.animation, clock);

    let (speech_tx, speech_rx) = speech_channel();
    let (bridge, microphone) = ConsoleBridge::new(&config.speech, speech_tx);
    let client: Arc<dyn ResponseClient> = Arc::new(GeminiClient::new(&config.response)?);

    let (user_tx, user_rx) = mpsc::channel(8);
    let (events_tx, events_rx) = broadcast::channel(64);

    let coordinator = ConversationCoordinator::new(
        &config,
        animator,
        Box::new(bridge.quiet()),
        speech_rx,
        client,
    )
    .with_runtime_events(events_tx)
    .with_user_commands(user_rx);
    let cancel = coordinator.cancel_token();
    let coordinator = tokio::spawn(coordinator.run());
    let view = tokio::spawn(show_status(events_rx));

    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C, shutting down...");
            cancel_clone.cancel();
        }
    });

    println!("\nType /start to begin, /stop to end, /quit to exit. Other lines are heard as speech.\n");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        if !route_line(line.trim(), &user_tx, &microphone).await {
            break;
        }
    }

    cancel.cancel();
    coordinator.await??;
    view.abort();
    Ok(())
}

/// Handle one typed line. Returns `false` to quit.
async fn route_line(
    line: &str,
    user_tx: &mpsc::Sender<UserCommand>,
    microphone: &ConsoleMicrophone,
) -> bool {
    let command = match line {
        "" => return true,
        "/quit" | "/exit" => return false,
        "/start" => UserCommand::Start,
        "/stop" => UserCommand::Stop,
        "/toggle" => UserCommand::Toggle,
        speech => {
            if !microphone.hear(speech).await {
                println!("(not listening)");
            }
            return true;
        }
    };
    user_tx.send(command).await.is_ok()
}

async fn show_status(mut events: broadcast::Receiver<RuntimeEvent>) {
    let mut panel = StatusPanel::new();
    loop {
        match events.recv().await {
            Ok(event) => {
                if panel.apply(&event) {
                    println!("{}\n", panel.render());
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("status view lagged by {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn inspect(source: &str) -> anyhow::Result<()> {
    let mut loader = AvatarLoader::new()?;
    let scene = loader.load(source).await?;
    let scene = scene
        .lock()
        .map_err(|_| anyhow::anyhow!("avatar scene lock poisoned"))?;

    println!("{source}");
    for mesh in &scene.meshes {
        println!("  mesh {} ({} blend shapes)", mesh.name, mesh.morph_targets.len());
        for name in mesh.morph_targets.names() {
            println!("    - {name}");
        }
    }
    println!("  {} nodes", scene.nodes.len());
    Ok(())
}
