use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::cli::config::EngineConfig;
use crate::fetch::engine::FetchEngine;
use crate::fetch::result::ProtocolStatus;
use crate::fetch::task::FetchTask;
use crate::schedule::pool::SchedulerPool;
use crate::schedule::scheduler::Scheduler;
use crate::utils::cancel::{self, CancelToken};

fn load_config(profile: &Option<String>) -> Result<EngineConfig> {
    match profile {
        Some(name) => EngineConfig::load_profile(name)
            .with_context(|| format!("failed to load profile {name}")),
        None => EngineConfig::load_default(),
    }
}

/// Fetch a single page and print the structured result
pub async fn fetch(url: String, profile: Option<String>, output: Option<PathBuf>) -> Result<()> {
    Url::parse(&url).with_context(|| format!("invalid url: {url}"))?;

    let config = load_config(&profile)?;
    let engine = FetchEngine::new(&config);

    let task = FetchTask::new(0, url);
    let result = engine.fetch(&task).await;
    engine.shutdown().await;

    if let Some(path) = output {
        match &result.response.content {
            Some(content) => {
                fs::write(&path, content)
                    .await
                    .with_context(|| format!("could not write {}", path.display()))?;
                info!("Rendered page written to {}", path.display());
            }
            None => warn!("No page content captured, nothing written"),
        }
    }

    // The content can be megabytes; keep the printed summary readable
    let mut printable = result.clone();
    printable.response.content = None;
    println!("{}", serde_json::to_string_pretty(&printable)?);

    if result.is_success() {
        Ok(())
    } else {
        anyhow::bail!("fetch ended with status {:?}", result.status())
    }
}

/// Fetch every URL in a file as one batch, with retry routing
pub async fn batch(
    file: PathBuf,
    batch_id: u32,
    workers: Option<usize>,
    profile: Option<String>,
) -> Result<()> {
    let mut config = load_config(&profile)?;
    if let Some(w) = workers {
        config.fetch.workers = w;
    }
    let workers = config.fetch.workers.max(1);
    let politeness = Duration::from_millis(config.fetch.politeness_delay_ms);

    let raw = fs::read_to_string(&file)
        .await
        .with_context(|| format!("could not read {}", file.display()))?;

    let mut scheduler = Scheduler::new(batch_id);
    let mut queued = 0usize;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match Url::parse(line) {
            Ok(_) => {
                if scheduler.push(line) {
                    queued += 1;
                }
            }
            Err(e) => warn!("Skipping invalid url {}: {}", line, e),
        }
    }
    info!("Queued {} urls for batch {}", queued, batch_id);

    let pool = SchedulerPool::new();
    pool.put(scheduler).await;

    let engine = Arc::new(FetchEngine::new(&config));
    let stop = CancelToken::new();
    {
        let stop = stop.clone();
        let engine = engine.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, shutting down");
                stop.cancel();
                engine.shutdown().await;
            }
        });
    }

    let mut succeeded = 0usize;
    let mut failed = 0usize;
    let mut retry_queue: VecDeque<(String, u32)> = VecDeque::new();

    loop {
        if stop.is_canceled() {
            break;
        }

        let mut items: Vec<(String, u32)> = Vec::new();
        while items.len() < workers {
            match retry_queue.pop_front() {
                Some(item) => items.push(item),
                None => break,
            }
        }
        if items.len() < workers {
            if let Some((_, keys)) = pool.random_fetch_items(workers - items.len()).await {
                items.extend(keys.into_iter().map(|key| (key, 0)));
            }
        }
        if items.is_empty() {
            break;
        }

        let results = stream::iter(items)
            .map(|(url, n_retries)| {
                let engine = engine.clone();
                async move {
                    let task = FetchTask::with_retries(batch_id, url, n_retries);
                    engine.fetch(&task).await
                }
            })
            .buffer_unordered(workers)
            .collect::<Vec<_>>()
            .await;

        for result in results {
            match result.status() {
                ProtocolStatus::Success => succeeded += 1,
                ProtocolStatus::Retry(scope) => {
                    debug!("Retrying {} at {:?} scope", result.url, scope);
                    retry_queue.push_back((result.url, result.n_retries + 1));
                }
                ProtocolStatus::Failed(_) => failed += 1,
                ProtocolStatus::Canceled => {}
            }
        }

        if !cancel::idle(politeness, &stop).await {
            break;
        }
    }

    engine.shutdown().await;

    let snapshot = engine.metrics();
    info!(
        "Batch {} finished: {} ok, {} failed, {} still queued",
        batch_id,
        succeeded,
        failed,
        retry_queue.len() + pool.total_pending().await
    );
    info!(
        "Navigations: {}, evaluations: {}, cancellations: {}",
        snapshot.navigations, snapshot.evaluations, snapshot.cancellations
    );

    Ok(())
}

/// List all available configuration profiles
pub async fn list_profiles() -> Result<()> {
    let names = EngineConfig::list_profiles()?;
    if names.is_empty() {
        println!("No configuration profiles found");
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// Show a named configuration profile
pub async fn show_profile(name: String) -> Result<()> {
    let config = EngineConfig::load_profile(&name)
        .with_context(|| format!("failed to load profile {name}"))?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

/// Show the current default configuration
pub async fn show_config() -> Result<()> {
    let config = EngineConfig::load_default()?;
    println!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}
