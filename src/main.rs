use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use stream_saver::codec::list_supported_options;
use stream_saver::encoder::{find_ffmpeg, FfmpegEncoderFactory, FfmpegProbe};
use stream_saver::settings::JsonFileStore;
use stream_saver::sink::{DenyPicker, DestinationPicker, DirectoryPicker, DownloadsDirectory};
use stream_saver::source::{PlaylistItem, PlaylistPage};
use stream_saver::{
    create_router, AppState, Config, ControllerHandle, NatsBridge, OutboundMessage, SessionConfig,
    SessionController,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stream-saver", version, about = "Record a playing media stream to a file")]
struct Cli {
    /// Config file (without extension)
    #[arg(short, long, default_value = "config/stream-saver")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API (and the NATS bridge when enabled)
    Serve,
    /// Print the supported codec options as JSON
    Codecs,
    /// Record the given inputs one after another, then exit
    Record {
        /// Media URLs or file paths
        #[arg(required = true)]
        inputs: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(cfg).await,
        Commands::Codecs => {
            let probe = FfmpegProbe::detect(&find_ffmpeg()?)?;
            println!("{}", serde_json::to_string_pretty(&list_supported_options(&probe))?);
            Ok(())
        }
        Commands::Record { inputs } => {
            let items = inputs.into_iter().map(PlaylistItem::new).collect();
            record(cfg, items).await
        }
    }
}

fn session_config(cfg: &Config, page: PlaylistPage) -> Result<SessionConfig> {
    let ffmpeg = find_ffmpeg()?;
    let probe = FfmpegProbe::detect(&ffmpeg)?;

    let picker: Arc<dyn DestinationPicker> = if cfg.output.use_file_picker {
        Arc::new(DirectoryPicker::new(&cfg.output.directory))
    } else {
        Arc::new(DenyPicker)
    };

    Ok(SessionConfig::new(
        Arc::new(page),
        Arc::new(FfmpegEncoderFactory::new(ffmpeg)),
        Arc::new(probe),
        picker,
        Arc::new(DownloadsDirectory::new(&cfg.output.downloads_directory)),
        Arc::new(JsonFileStore::new(&cfg.settings.store_path)),
    ))
}

async fn serve(cfg: Config) -> Result<()> {
    let page = PlaylistPage::new(cfg.playlist.clone());
    let controller = SessionController::spawn(session_config(&cfg, page)?).await?;

    if cfg.nats.enabled {
        let bridge = NatsBridge::connect(&cfg.nats.url, cfg.nats.subject_prefix.clone()).await?;
        let handle = controller.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge.run(handle).await {
                error!("NATS bridge stopped: {:#}", e);
            }
        });
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, create_router(AppState::new(controller.clone())))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    if controller.is_running().await.unwrap_or(false) {
        controller.stop().await?;
        wait_until_idle(&controller).await?;
    }

    Ok(())
}

async fn record(cfg: Config, items: Vec<PlaylistItem>) -> Result<()> {
    let page = PlaylistPage::new(items);
    let controller = SessionController::spawn(session_config(&cfg, page)?).await?;

    controller.start().await?;
    if !controller.is_running().await? {
        warn!("Recording did not start");
        return Ok(());
    }

    tokio::select! {
        result = wait_until_idle(&controller) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping recording");
            controller.stop().await?;
            wait_until_idle(&controller).await?;
        }
    }

    info!("All recordings finished");
    Ok(())
}

/// Wait for a `running = false` push that is not followed by a restart
async fn wait_until_idle(controller: &ControllerHandle) -> Result<()> {
    let mut pushes = controller.subscribe();

    while controller.is_running().await? {
        loop {
            match pushes.recv().await {
                Ok(OutboundMessage::Running(false)) => break,
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => break,
                Err(e) => return Err(e).context("Controller events closed"),
            }
        }
    }

    Ok(())
}
