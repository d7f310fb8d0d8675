use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::{io, time::Duration};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

use pvrdeck::app::App;
use pvrdeck::config::ConfigManager;
use pvrdeck::device::PuppyClient;
use pvrdeck::ui;

/// Copy recordings between this computer and a Topfield PVR.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the puppy helper
    #[arg(long)]
    helper: Option<String>,

    /// Start the computer panel in this directory
    #[arg(long)]
    local_dir: Option<PathBuf>,

    /// Start the PVR panel in this directory, e.g. "\DataFiles"
    #[arg(long)]
    remote_dir: Option<String>,

    /// Use turbo mode for transfers
    #[arg(long)]
    turbo: bool,

    /// Use this config file instead of the per-user one
    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_logging() -> Result<()> {
    let log_dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pvrdeck")
        .join("logs");
    std::fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join(format!(
        "pvrdeck_{}.log",
        Local::now().format("%Y%m%d_%H%M%S")
    ));
    let file = File::create(&log_file).context("Failed to create log file")?;

    // The terminal belongs to the UI, so logs only go to the file.
    fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(EnvFilter::from_default_env().add_directive("pvrdeck=debug".parse()?))
        .with_ansi(false)
        .with_writer(file)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging()?;
    debug!("Starting pvrdeck with {:?}", args);

    let config_manager = match &args.config {
        Some(path) => ConfigManager::with_file(path)?,
        None => ConfigManager::new()?,
    };
    let mut config = config_manager
        .load_config()
        .context("Failed to load config")?;
    if let Some(helper) = args.helper {
        config.helper = helper;
    }
    if let Some(dir) = args.local_dir {
        config.last_local_dir = Some(dir);
    }
    if let Some(dir) = args.remote_dir {
        config.last_remote_dir = Some(dir);
    }
    if args.turbo {
        config.turbo = true;
    }

    let client = PuppyClient::with_lock_file(config.helper.clone(), config.lock_file.clone());
    if !client.helper_available() {
        warn!("Transfer helper {} not found", client.program());
    }

    let mut app = App::new(config, Arc::new(client)).with_config_manager(config_manager);
    app.start_worker().context("Failed to start transfer worker")?;
    app.refresh_all();

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = app.save_state() {
        warn!("Failed to save settings: {:#}", e);
    }
    if let Err(err) = res {
        eprintln!("Error: {:#}", err);
    }
    info!("pvrdeck exited");

    Ok(())
}

async fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.tick();
        if app.should_quit {
            return Ok(());
        }

        terminal.draw(|f| ui::draw::<B>(f, app))?;

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                app.handle_key(key)?;
            }
        }
    }
}
