use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, bail, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use fieldsync::application::{
    DisplayImage, DrainReport, DrainStop, EngineConfig, RetryPolicy, SyncEngine,
};
use fieldsync::domain::entities::{ApiKey, TargetRef, UploadId, UploadKind};
use fieldsync::infrastructure::config::{API_KEY_ENV, AppConfig, CliArgs, Command, StorageManager};
use fieldsync::infrastructure::connectivity::{HttpReachabilityProbe, MonitorConfig};
use fieldsync::infrastructure::remote::HttpRemote;

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let manager = StorageManager::new().wrap_err("failed to locate config directory")?;
    let mut config = manager
        .load_config(args.config.as_deref())
        .wrap_err("failed to load configuration")?;
    config.merge_with_args(args);
    Ok(config)
}

fn engine_config(config: &AppConfig, data_dir: PathBuf) -> EngineConfig {
    let retry = RetryPolicy::default()
        .with_max_attempts(config.retry.max_attempts)
        .with_base_delay(Duration::from_millis(config.retry.base_delay_ms))
        .with_max_delay(Duration::from_millis(config.retry.max_delay_ms))
        .with_jitter(Duration::from_millis(config.retry.jitter_ms));
    let monitor = MonitorConfig::default()
        .with_poll_interval(Duration::from_millis(config.connectivity.poll_interval_ms))
        .with_debounce(Duration::from_millis(config.connectivity.debounce_ms));

    EngineConfig {
        data_dir,
        cache_quota_bytes: config.cache.quota_bytes,
        memory_entries: config.cache.memory_entries,
        retry,
        monitor,
    }
}

async fn start_engine(config: &AppConfig) -> Result<SyncEngine> {
    let data_dir = config
        .effective_data_dir()
        .ok_or_else(|| eyre!("could not determine a data directory, pass --data-dir"))?;

    let api_key = config
        .remote
        .resolve_api_key(std::env::var(API_KEY_ENV).ok())
        .map(|raw| ApiKey::new(raw).ok_or_else(|| eyre!("configured API key is malformed")))
        .transpose()?;
    if api_key.is_none() {
        info!("No API key configured, requests are unauthenticated");
    }

    let remote = Arc::new(HttpRemote::new(&config.remote, api_key)?);
    let probe = Arc::new(
        HttpReachabilityProbe::new(
            config.probe_url(),
            Duration::from_millis(config.connectivity.probe_timeout_ms),
        )
        .wrap_err("failed to create reachability probe")?,
    );

    let engine = SyncEngine::start(
        engine_config(config, data_dir),
        remote.clone(),
        remote,
        probe,
    )
    .await?;
    Ok(engine)
}

/// Drains until the queue is settled, waiting out a drain that is already
/// running in the background.
async fn drain_and_wait(engine: &SyncEngine) -> DrainReport {
    loop {
        let report = engine.sync_now().await;
        if report.stop != DrainStop::AlreadyDraining {
            return report;
        }
        let mut state = engine.subscribe();
        let _ = state.wait_for(|s| !s.is_draining()).await;
    }
}

fn print_report(report: &DrainReport) {
    println!(
        "delivered {}, retried {}, failed {} ({:?})",
        report.delivered, report.retried, report.failed, report.stop
    );
}

fn parse_upload_id(raw: &str) -> Result<UploadId> {
    UploadId::parse(raw).ok_or_else(|| eyre!("not an upload id: {raw}"))
}

fn raw_mime_type(file: &Path) -> Result<&'static str> {
    image::ImageFormat::from_path(file)
        .map(|format| format.to_mime_type())
        .wrap_err_with(|| format!("cannot tell the image type of {}", file.display()))
}

async fn run_command(engine: &SyncEngine, command: Command) -> Result<()> {
    match command {
        Command::Run => {
            let mut state = engine.subscribe();
            println!("{}", *state.borrow_and_update());
            loop {
                tokio::select! {
                    result = tokio::signal::ctrl_c() => {
                        result?;
                        info!("Interrupted, shutting down");
                        break;
                    }
                    changed = state.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        println!("{}", *state.borrow_and_update());
                    }
                }
            }
        }
        Command::Status => {
            println!("{}", engine.sync_state());
            for upload in engine.failed_uploads().await {
                println!(
                    "failed {} {} attempts={} {}",
                    upload.id,
                    upload.target,
                    upload.attempts,
                    upload.last_error.as_deref().unwrap_or("")
                );
            }
        }
        Command::Sync => {
            if !engine.sync_state().connectivity.is_online() {
                println!("offline, {} uploads waiting", engine.sync_state().pending_count);
                return Ok(());
            }
            print_report(&drain_and_wait(engine).await);
        }
        Command::Enqueue {
            file,
            entity,
            record_id,
            slot,
            kind,
            raw,
        } => {
            let bytes = Bytes::from(
                tokio::fs::read(&file)
                    .await
                    .wrap_err_with(|| format!("failed to read {}", file.display()))?,
            );
            let kind = UploadKind::from(kind);
            let target = TargetRef::new(entity, record_id, slot);

            let id = if raw {
                engine
                    .enqueue_upload(kind, target, bytes, raw_mime_type(&file)?)
                    .await?
            } else {
                engine.capture_photo(kind, target, bytes).await?
            };
            println!("queued {id}");

            if engine.sync_state().connectivity.is_online() {
                print_report(&drain_and_wait(engine).await);
            }
        }
        Command::Failed => {
            for upload in engine.failed_uploads().await {
                println!(
                    "{}\t{}\t{}\t{}",
                    upload.id,
                    upload.target,
                    upload.attempts,
                    upload.last_error.as_deref().unwrap_or("")
                );
            }
        }
        Command::Retry { id } => {
            engine.retry_failed(parse_upload_id(&id)?).await?;
            println!("re-queued {id}");
            if engine.sync_state().connectivity.is_online() {
                print_report(&drain_and_wait(engine).await);
            }
        }
        Command::Discard { id } => {
            engine.discard(parse_upload_id(&id)?).await?;
            println!("discarded {id}");
        }
        Command::Thumb {
            reference,
            variant,
            output,
        } => match engine.image(&reference, variant).await {
            DisplayImage::Ready {
                bytes,
                mime_type,
                origin,
            } => {
                tokio::fs::write(&output, &bytes)
                    .await
                    .wrap_err_with(|| format!("failed to write {}", output.display()))?;
                println!("{} ({mime_type}, {} bytes, {origin:?})", output.display(), bytes.len());
            }
            DisplayImage::Broken { reason } => bail!("image unavailable: {reason}"),
        },
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = fieldsync::VERSION, "Starting {}", fieldsync::NAME);

    let engine = start_engine(&config).await?;
    let result = run_command(&engine, args.command.unwrap_or(Command::Status)).await;
    engine.shutdown().await;

    result
}
