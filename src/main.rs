use std::sync::Arc;
use anyhow::Context;
use tokio::sync::broadcast::error::RecvError;
use stowage::queue::{format_file_size, format_speed, format_time_remaining};
use stowage::remote::memory::{MemoryBlobStore, MemoryFileRecords, StaticIdentity};
use stowage::remote::HttpBackend;
use stowage::{logging, FileSource, QueueConfig, UploadEvent, UploadQueue};

/// Upload the files named on the command line.
///
/// `STOWAGE_CONFIG` points at a TOML config; with `STOWAGE_ACCESS_TOKEN` set the
/// hosted backend from `[remote]` is used, otherwise an in-memory one.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("STOWAGE_CONFIG") {
        Ok(path) => QueueConfig::load(&path)
            .await
            .with_context(|| format!("Failed to load config {}", path))?,
        Err(_) => QueueConfig::default(),
    };
    logging::init_logging(&config.log_filter)?;

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        anyhow::bail!("usage: stowage <file>...");
    }

    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        let file = FileSource::from_path(path)
            .await
            .with_context(|| format!("Failed to read {}", path))?;
        println!("{} ({})", file.name, format_file_size(file.size()));
        files.push(file);
    }

    let builder = UploadQueue::builder().config(config.clone());
    let builder = match std::env::var("STOWAGE_ACCESS_TOKEN") {
        Ok(token) => builder.backend(Arc::new(HttpBackend::new(&config.remote)?.with_access_token(token))),
        Err(_) => builder
            .identity(Arc::new(StaticIdentity::signed_in("local")))
            .blob_store(Arc::new(MemoryBlobStore::new()))
            .file_records(Arc::new(MemoryFileRecords::new())),
    };
    let handle = builder.build().context("Failed to start upload queue")?;

    let mut events = handle.queue.subscribe_events();
    handle.queue.enqueue(files).await?;

    loop {
        match events.recv().await {
            Ok(UploadEvent::Progress { upload_id, progress }) => {
                println!(
                    "{} {:>3}% {} {}",
                    upload_id,
                    progress.progress,
                    format_speed(progress.speed),
                    format_time_remaining(progress.time_remaining),
                );
            }
            Ok(UploadEvent::Completed { upload_id, storage_path }) => {
                println!("{} uploaded to {}", upload_id, storage_path);
            }
            Ok(UploadEvent::Failed { upload_id, error }) => {
                eprintln!("{} failed: {}", upload_id, error);
            }
            Ok(UploadEvent::Idle) => break,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => break,
        }
    }

    handle.shutdown().await?;
    Ok(())
}
