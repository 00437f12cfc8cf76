//! clipdeck - command-line front end for the clip engine
//!
//! Trims source files into stored WAV clips and manages/plays the stored
//! sounds. Everything here is a thin layer over the library.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clipdeck_common::events::{ClipDeckEvent, EventBus};
use clipdeck_engine::audio::{ByteSource, TrimRange};
use clipdeck_engine::config::{ConfigOverrides, EngineConfig};
use clipdeck_engine::playback::{PlaybackBackend, PlatformProbe};
use clipdeck_engine::store::{ClipSource, FsClipSource, SoundCatalog, SqliteSoundStore};
use clipdeck_engine::{ClipPipeline, PlaybackSessionManager};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Command-line arguments for clipdeck
#[derive(Parser, Debug)]
#[command(name = "clipdeck")]
#[command(about = "Trim, store, and play short sound clips")]
#[command(version)]
struct Args {
    /// Configuration file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Root folder holding the database and stored clips
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cut a range out of a media file and store it as a clip
    Trim {
        /// Source audio or video file
        input: PathBuf,

        /// Range start in seconds
        #[arg(long)]
        start: f64,

        /// Range end in seconds (clamped to the source duration)
        #[arg(long)]
        end: f64,

        /// Title for the stored clip (default: input file name)
        #[arg(long)]
        title: Option<String>,

        /// Write the WAV to this path instead of the store
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored clips, newest first
    List {
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change the title of a stored clip
    Rename { id: Uuid, title: String },

    /// Delete a stored clip by locator
    Delete { locator: String },

    /// Play a stored clip (by locator) or a media file (with --file)
    Play {
        target: String,

        /// Treat the target as a file path instead of a store locator
        #[arg(long)]
        file: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let overrides = ConfigOverrides {
        config_path: args.config.clone(),
        database_path: args.database.clone(),
        root_folder: args.root_folder.clone(),
    };
    let config = EngineConfig::load(&overrides).context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "clipdeck {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("CLIPDECK_GIT_HASH"),
        env!("CLIPDECK_BUILD_TIMESTAMP"),
        env!("CLIPDECK_BUILD_PROFILE")
    );
    for warning in &config.load_warnings {
        warn!("{}", warning);
    }
    info!(
        "Root folder: {} ({:?})",
        config.root_folder.display(),
        config.root_folder_source
    );

    match args.command {
        Command::Trim {
            input,
            start,
            end,
            title,
            output,
        } => trim_command(&config, input, TrimRange::new(start, end), title, output).await,
        Command::List { json } => list_command(&config, json).await,
        Command::Rename { id, title } => {
            let catalog = open_catalog(&config).await?;
            let record = catalog.rename(id, &title).await.context("Rename failed")?;
            println!("{}  {}", record.id, record.title);
            Ok(())
        }
        Command::Delete { locator } => {
            let catalog = open_catalog(&config).await?;
            if catalog.delete(&locator).await.context("Delete failed")? {
                println!("Deleted {}", locator);
                Ok(())
            } else {
                bail!("No clip stored under {}", locator)
            }
        }
        Command::Play { target, file } => play_command(&config, target, file).await,
    }
}

async fn open_store(config: &EngineConfig) -> Result<Arc<SqliteSoundStore>> {
    let store = SqliteSoundStore::open(&config.database_path, &config.root_folder)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    Ok(Arc::new(store))
}

async fn open_catalog(config: &EngineConfig) -> Result<SoundCatalog> {
    let catalog = SoundCatalog::new(open_store(config).await?);
    catalog.refresh().await.context("Failed to load catalog")?;
    Ok(catalog)
}

async fn trim_command(
    config: &EngineConfig,
    input: PathBuf,
    range: TrimRange,
    title: Option<String>,
    output: Option<PathBuf>,
) -> Result<()> {
    let pipeline = ClipPipeline::new(config.decode_adapter());
    let source = ByteSource::File(input.clone());

    if let Some(output) = output {
        let clip = pipeline
            .trim_to_clip(source, range)
            .await
            .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
        tokio::fs::write(&output, clip.bytes())
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!(
            "Wrote {} ({} bytes, {:.3}s)",
            output.display(),
            clip.byte_length(),
            clip.duration_seconds()
        );
        return Ok(());
    }

    let title = title.unwrap_or_else(|| default_title(&input));
    let store = open_store(config).await?;
    let record = pipeline
        .trim_and_save(source, range, &title, store.as_ref())
        .await
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;

    println!(
        "{}  {}  {:.3}s  {}",
        record.id, record.title, record.duration_seconds, record.source_locator
    );
    Ok(())
}

fn default_title(input: &Path) -> String {
    input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

async fn list_command(config: &EngineConfig, json: bool) -> Result<()> {
    let catalog = open_catalog(config).await?;
    let records = catalog.records().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:>8.3}s  {:>9} B  {}  {}",
            record.created_at.format("%Y-%m-%d %H:%M"),
            record.duration_seconds,
            record.byte_size,
            record.source_locator,
            record.title
        );
    }
    if records.is_empty() {
        println!("No clips stored");
    }
    Ok(())
}

#[cfg(feature = "device-output")]
fn playback_backend(config: &EngineConfig) -> Result<Arc<dyn PlaybackBackend>> {
    let backend = clipdeck_engine::audio::DeviceBackend::open(config.device.clone())
        .context("Failed to open audio device")?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "device-output"))]
fn playback_backend(_config: &EngineConfig) -> Result<Arc<dyn PlaybackBackend>> {
    warn!("Built without device-output; playing silently on the clock backend");
    Ok(Arc::new(clipdeck_engine::playback::ClockBackend::new()))
}

async fn play_command(config: &EngineConfig, target: String, file: bool) -> Result<()> {
    let source: Arc<dyn ClipSource> = if file {
        Arc::new(FsClipSource::new())
    } else {
        open_store(config).await?
    };

    let events = EventBus::default();
    let mut rx = events.subscribe();
    let manager = PlaybackSessionManager::builder(playback_backend(config)?, source)
        .decoder(config.decode_adapter())
        .events(events)
        .probe(&PlatformProbe::with_override(config.platform))
        .build();

    // Running the command is the user gesture
    manager.prime_audio().await?;

    let session = manager
        .play(&target, &target)
        .await
        .map_err(|e| anyhow::anyhow!("{} ({})", e.user_message(), e))?;
    info!("Session {} is {}", session.session_id, session.state);

    if session.state.is_terminal() {
        return Ok(());
    }

    let finished = async {
        loop {
            match rx.recv().await {
                Ok(ClipDeckEvent::SessionStateChanged {
                    session_id,
                    new_state,
                    ..
                }) if session_id == session.session_id && new_state.is_terminal() => {
                    return new_state;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Missed {} playback events", n);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    return manager.state().await;
                }
            }
        }
    };

    tokio::select! {
        state = finished => info!("Playback finished: {}", state),
        _ = shutdown_signal() => manager.shutdown().await,
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
