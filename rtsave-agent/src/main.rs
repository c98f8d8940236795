//! rtsave agent — headless autosave for one wiki page.
//!
//! Watches a local file as the editable content and runs the save/merge
//! engine against the wiki's HTTP endpoints. The realtime channel is an
//! in-process hub, so the agent is the only participant.

mod policy;
mod surface;

use clap::Parser;
use log::info;
use rtsave_engine::collab::{Collaborators, EditorSurface};
use rtsave_engine::{HttpBackend, Saver, SaverConfig, SaverError, SharedMapHub};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use policy::{ConflictPolicy, PolicyPrompt};
use surface::FileSurface;

/// Agent command line arguments.
#[derive(Parser, Debug)]
#[command(name = "rtsave-agent")]
#[command(about = "Autosave a local file to a wiki page with server-side merging")]
struct Args {
    /// Saver configuration (JSON, camelCase keys)
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// File holding the page content
    #[arg(short, long, value_name = "PATH")]
    file: PathBuf,

    /// Answer to merge conflicts
    #[arg(long, value_enum, default_value_t = ConflictPolicy::Defer)]
    on_conflict: ConflictPolicy,

    /// How often the file is checked for edits
    #[arg(long, default_value_t = 1000)]
    poll_ms: u64,

    /// HTTP request timeout
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Save once more before exiting
    #[arg(long)]
    save_on_exit: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn load_config(path: &Path) -> Result<SaverConfig, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let config: SaverConfig = serde_json::from_str(&raw)?;
    config.validate()?;
    if !config.merge_content {
        return Err(SaverError::Config("the agent needs mergeContent enabled".into()).into());
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = load_config(&args.config)?;
    if config.channel.is_empty() {
        config.channel = format!("{}-{}", config.document, config.editor_type);
    }

    let surface = Arc::new(FileSurface::open(&args.file)?);
    let backend = Arc::new(HttpBackend::new(
        config.clone(),
        Duration::from_secs(args.timeout_secs),
    )?);
    let collab = Collaborators::new(
        backend,
        surface.clone(),
        surface.clone(),
        Arc::new(PolicyPrompt::new(args.on_conflict)),
    );

    let hub = SharedMapHub::new(64);
    let transport = Arc::new(hub.connect(config.channel.clone()));
    let document = config.document.clone();
    let saver = Saver::new(config, collab, transport);
    if let Some(initial) = surface.text_value() {
        saver.set_last_saved_content(initial).await;
    }
    saver.start().await?;
    info!("watching {} for {document}", surface.path().display());

    let mut ticker = tokio::time::interval(Duration::from_millis(args.poll_ms.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if surface.poll_edit() {
                    log::debug!("local edit detected");
                    saver.set_local_edit_flag(true).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    if args.save_on_exit {
        if let Err(e) = saver.save_and_continue().await {
            log::warn!("final save failed: {e}");
        }
    }
    saver.stop().await;
    Ok(())
}
