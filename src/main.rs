use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use recording_uploader::{
    create_router, AppState, ChunkRecorder, Config, FileEnd, FileSource, NatsClient, RecorderCallbacks,
    RecorderConfig, RecordingKind, TransportFactory,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "recording-uploader")]
#[command(about = "Record media streams straight into object storage")]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/recording-uploader")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,

    /// Record a media file through the upload pipeline
    Upload {
        /// Media file to record
        file: PathBuf,

        /// Recording kind
        #[arg(short, long, value_enum)]
        kind: Option<RecordingKind>,

        /// Chunk emission interval in milliseconds
        #[arg(short, long)]
        timeslice_ms: Option<u64>,
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

    match cli.command {
        Command::Serve => serve(cfg).await,
        Command::Upload {
            file,
            kind,
            timeslice_ms,
        } => upload(cfg, file, kind, timeslice_ms).await,
    }
}

async fn serve(cfg: Config) -> Result<()> {
    let mut state = AppState::new(cfg.recorder.clone(), cfg.storage.clone());

    if let Some(nats) = &cfg.nats {
        state = state.with_nats(NatsClient::connect(&nats.url).await?);
    }

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    info!("Object store: {}", cfg.storage.root_path().display());

    let app = create_router(state.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await
        .context("HTTP server failed")?;

    state.cancel_all().await;
    info!("Server stopped");

    Ok(())
}

async fn upload(
    cfg: Config,
    file: PathBuf,
    kind: Option<RecordingKind>,
    timeslice_ms: Option<u64>,
) -> Result<()> {
    let mut config = RecorderConfig::from(&cfg.recorder);
    if let Some(kind) = kind {
        config.kind = kind;
    }
    if let Some(timeslice_ms) = timeslice_ms {
        config.timeslice = Duration::from_millis(timeslice_ms);
    }

    let source = FileSource::open(&file).await?;
    let mut ended = source.subscribe_end();

    let transport = TransportFactory::create(&cfg.storage, config.part_size)?;
    let callbacks = RecorderCallbacks::default()
        .on_progress(|progress| {
            info!(
                "Uploaded {:.1}% ({} / {} bytes)",
                progress.percentage, progress.bytes_sent, progress.bytes_total
            );
        })
        .on_error(|err| warn!("Recording error: {}", err));

    let recorder = ChunkRecorder::new(config, transport).with_callbacks(callbacks);
    let recording_id = recorder.start(Box::new(source)).await?;

    info!("Recording {} from {}", recording_id, file.display());

    let end = tokio::select! {
        result = ended.wait_for(|end| end.is_some()) => {
            result.ok().and_then(|end| end.clone())
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, cancelling recording {}", recording_id);
            recorder.cancel().await;
            return Ok(());
        }
    };

    if let Some(FileEnd::Failed(reason)) = end {
        recorder.cancel().await;
        bail!(
            "Recording {} abandoned, reading {} failed: {}",
            recording_id,
            file.display(),
            reason
        );
    }

    let url = recorder.stop().await?;
    println!("{}", url);

    Ok(())
}
