use crate::config::AppConfig;
use crate::db;
use crate::errors::AppResult;
use crate::models::feed::Feed;
use crate::security::TokenVault;
use crate::tasks::feed_worker::FeedWorker;
use crate::tasks::scheduler::{Scheduler, TaskFn};
use crate::telegram::Dispatcher;
use std::sync::Arc;
use tokio::sync::watch;

/// Long-running service mode: loads every enabled feed, hands them to the
/// scheduler, and runs until SIGINT. Nothing here aborts on a per-feed
/// failure; the worker isolates those.
#[tokio::main]
pub async fn run_service(config: &AppConfig, dry_run: bool) -> AppResult<()> {
    if dry_run {
        log::info!("Dry-run mode: items are formatted but not sent or persisted");
    }

    let pool = db::initialize_db_pool(&config.database_url)?;
    let vault = Arc::new(TokenVault::new(&config.encryption_key)?);
    let dispatcher = Arc::new(Dispatcher::new());
    let worker = Arc::new(FeedWorker::new(
        pool.clone(),
        vault,
        dispatcher,
        dry_run,
        config.initial_backfill,
    ));

    let scheduler = Arc::new(Scheduler::with_default_frequency(
        config.default_frequency_seconds,
    ));

    let feeds = {
        let mut conn = pool.get()?;
        Feed::get_enabled(&mut conn)?
    };
    if feeds.is_empty() {
        log::info!("No enabled feeds found; add one with 'feedgram feed add'");
    }
    for feed in &feeds {
        let worker = worker.clone();
        let task: TaskFn = Arc::new(move |scheduled| {
            let worker = worker.clone();
            Box::pin(async move { worker.process(scheduled.id).await })
        });
        scheduler.add(feed, task);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let loop_scheduler = scheduler.clone();
    let loop_handle = tokio::spawn(async move { loop_scheduler.run(shutdown_rx).await });

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal");

    let _ = shutdown_tx.send(true);
    let _ = loop_handle.await;
    // In-flight runs are cancelled at their next await point when the
    // runtime winds down.
    log::info!("Application shut down");
    Ok(())
}
