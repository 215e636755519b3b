use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use voxline_core::job::{JobUpdate, SubmitJob};
use voxline_core::job_status::JobStatus;
use voxline_core::services::FileStorageService;
use voxline_db::MemoryDatabase;
use voxline_events::{
    EventBus, EventPersistence, JobEvent, JobProgress, EVENT_JOB_PROGRESS, EVENT_JOB_UPDATED,
};
use voxline_worker::{
    CommandNarrator, Engines, FfmpegMixer, LocalFileStorage, LogFormat, StatusReporter,
    WorkerConfig, WorkerPool,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env();
    init_tracing(config.as_ref().map_or(LogFormat::default(), |c| c.log_format));

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };

    // -- events ---------------------------------------------------------------

    let bus = Arc::new(EventBus::new());
    let db = Arc::new(MemoryDatabase::new());

    let (_persistence_subscriptions, persistence_rx) = EventPersistence::subscribe(&bus);
    let persistence = tokio::spawn(EventPersistence::run(db, persistence_rx));

    bus.on(EVENT_JOB_PROGRESS, |event| {
        let progress: JobProgress = event.decode_payload()?;
        tracing::debug!(job_id = %progress.id, percent = progress.percent, "Job progress");
        Ok(())
    });

    let storage = Arc::new(LocalFileStorage::new(&config.storage_root));
    let (_, updates_rx) = bus.subscribe_channel(EVENT_JOB_UPDATED);
    let publisher = tokio::spawn(publish_outputs(storage, updates_rx));

    // -- pool -----------------------------------------------------------------

    let engines = Engines::new(
        Arc::new(CommandNarrator::new(&config.narrator_command)),
        Arc::new(FfmpegMixer::new(&config.ffmpeg_path)),
    );
    let pool = Arc::new(WorkerPool::new(config.pool.clone(), engines, bus.clone()));

    for n in 1..=config.pool.worker_count {
        pool.add_worker(format!("worker-{n}")).await?;
    }
    pool.start().await?;

    let reporter_cancel = CancellationToken::new();
    let (_status_rx, reporter) = StatusReporter::spawn(
        Arc::clone(&pool),
        config.pool.status_interval,
        reporter_cancel.clone(),
    );

    if let Some(path) = &config.jobs_file {
        if let Err(e) = submit_jobs_file(&pool, path).await {
            tracing::error!(error = %format!("{e:#}"), "Jobs file not submitted");
        }
    }

    tracing::info!(
        workers = config.pool.worker_count,
        policy = ?config.pool.shutdown_policy,
        "Voxline worker running, press Ctrl-C to stop",
    );
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    tracing::info!("Shutdown signal received");
    pool.stop().await?;
    reporter_cancel.cancel();
    reporter.await.context("status reporter task failed")?;

    // Dropping the last publishers closes the subscriber channels.
    drop(pool);
    drop(bus);
    persistence.await.context("event persistence task failed")?;
    publisher.await.context("output publisher task failed")?;

    tracing::info!("Voxline worker stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "voxline_worker=info".into());

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (Some(fmt::layer()), None),
        LogFormat::Json => (None, Some(fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .init();
}

/// Submit every request in a JSON array file. Invalid entries are logged
/// and skipped.
async fn submit_jobs_file(pool: &WorkerPool, path: &Path) -> anyhow::Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let requests: Vec<SubmitJob> = serde_json::from_slice(&raw)
        .with_context(|| format!("{} is not a JSON array of job requests", path.display()))?;

    let total = requests.len();
    let mut accepted = 0usize;
    for (index, request) in requests.into_iter().enumerate() {
        match pool.submit_job(request.into_job()) {
            Ok(_) => accepted += 1,
            Err(e) => tracing::warn!(index, error = %e, "Job request rejected"),
        }
    }

    tracing::info!(file = %path.display(), accepted, total, "Jobs file submitted");
    Ok(())
}

/// Copy each completed job's output into file storage.
async fn publish_outputs(
    storage: Arc<LocalFileStorage>,
    mut updates: mpsc::UnboundedReceiver<JobEvent>,
) {
    while let Some(event) = updates.recv().await {
        let update: JobUpdate = match event.decode_payload() {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable job update");
                continue;
            }
        };
        if update.status != JobStatus::Completed {
            continue;
        }
        let Some(output) = update.output_file_path.as_deref().map(PathBuf::from) else {
            continue;
        };

        let file_name = output
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".into());
        let remote = format!("renders/{}/{file_name}", update.id);

        match storage.upload(&output, &remote).await {
            Ok(url) => tracing::info!(job_id = %update.id, url = %url, "Output stored"),
            Err(e) => tracing::warn!(job_id = %update.id, error = %e, "Failed to store output"),
        }
    }
}
