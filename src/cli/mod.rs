use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use tracing_subscriber::{fmt, EnvFilter};

use crate::ai::{AiGateway, GeminiGateway};
use crate::app::Workspace;
use crate::clock::SystemClock;
use crate::config::ConfigLoader;
use crate::storage;

pub mod commands;

use self::commands::{AiArgs, EditArgs, IdArgs, ListArgs, NewArgs};

#[derive(Parser, Debug)]
#[command(
    name = "mindscribe",
    version,
    about = "Local-first notes with AI-assisted titles, summaries and polishing"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file location (takes precedence over MINDSCRIBE_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over MINDSCRIBE_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List notes, newest first, optionally filtered by a search query
    List(ListArgs),
    /// Create a new note
    New(NewArgs),
    /// Print a single note
    Show(IdArgs),
    /// Change the title and/or content of a note
    Edit(EditArgs),
    /// Delete a note
    Delete(IdArgs),
    /// Run an AI action against a note and wait for the result
    Ai(AiArgs),
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var("MINDSCRIBE_CONFIG", path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var("MINDSCRIBE_DATA", path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let storage = storage::init(&paths, &config.storage)?;

    let gateway: Arc<dyn AiGateway> =
        Arc::new(GeminiGateway::from_config(&config.ai).context("configuring AI gateway")?);
    let mut workspace = Workspace::open(&config, storage, gateway, Arc::new(SystemClock));
    let ai_timeout = config.ai.timeout() + commands::AI_WAIT_SLACK;

    let output = match cli.command {
        Commands::List(args) => commands::list_notes(&mut workspace, &args),
        Commands::New(args) => {
            let content = match args.content {
                Some(content) => Some(content),
                None => commands::read_stdin()?,
            };
            commands::new_note(&mut workspace, args.title, content)
        }
        Commands::Show(args) => commands::show_note(&workspace, &args.id),
        Commands::Edit(args) => commands::edit_note(&mut workspace, args),
        Commands::Delete(args) => commands::delete_note(&mut workspace, &args.id),
        Commands::Ai(args) => commands::run_ai(&mut workspace, args, ai_timeout),
    };
    let flushed = commands::ensure_committed(workspace.flush());
    let output = output?;
    flushed?;
    print!("{output}");
    Ok(())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
