use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use chatline_core::{ChatSession, Config, LocalFileSource, Provider};
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(about = "Chat with hosted generative AI models from the terminal")]
struct Cli {
    /// Provider to use: gemini, claude, openai or ollama
    #[arg(short, long)]
    provider: Option<String>,
    /// Model name (defaults to the provider's default)
    #[arg(short, long)]
    model: Option<String>,
    /// File to attach to the first message (repeatable)
    #[arg(short, long)]
    attach: Vec<PathBuf>,
}

/// Log to a file so the alternate screen stays clean
fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory"))?
        .join("chatline");
    fs::create_dir_all(&log_dir)?;
    let log_file = File::create(log_dir.join("chatline.log"))
        .with_context(|| format!("Failed to create log file in {:?}", log_dir))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable config");
        Config::new()
    });
    if let Some(name) = cli.provider.as_deref() {
        let provider = Provider::from_str(name).ok_or_else(|| anyhow!("Unknown provider: {}", name))?;
        if provider != config.provider() {
            config.default_model = None;
        }
        config.provider = Some(provider.as_str().to_string());
    }
    if let Some(model) = cli.model {
        config.default_model = Some(model);
    }

    let gateway = config.build_gateway()?;
    let session = ChatSession::new(gateway);
    for path in &cli.attach {
        let reference = path.to_str().ok_or_else(|| anyhow!("Invalid path: {:?}", path))?;
        session.attach_from(&LocalFileSource, reference).await?;
    }

    let mut app = App::new(session, config.provider(), config.model());

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    // Dropping the session aborts any request still in flight
    drop(app);
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = EventHandler::new();
    let mut state_rx = app.session.subscribe();

    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        tokio::select! {
            event = events.next() => match event {
                Some(event) => handler::handle_event(app, event).await?,
                None => break,
            },
            Ok(()) = state_rx.changed() => {
                let state = state_rx.borrow_and_update().clone();
                app.sync_state(state);
            }
        }
    }

    tracing::info!(turns = app.state.messages().len(), "chat closed");
    Ok(())
}
