use crate::db::DbPool;
use crate::dedup;
use crate::errors::{AppError, AppResult};
use crate::fetch::{FeedFetcher, FetchOutcome};
use crate::formatter::Formatter;
use crate::models::feed::{Feed, FeedContext};
use crate::models::formatting_profile::FormatProfileConfig;
use crate::models::processed_item::ProcessedItem;
use crate::models::proxy::{Proxy, ProxyPurpose};
use crate::security::TokenVault;
use crate::telegram::Dispatcher;
use std::sync::Arc;
use std::time::Duration;

/// Hard ceiling on one end-to-end run: fetch, format, dispatch, persist.
pub const PROCESS_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Feed disappeared or was disabled between scheduling and the run.
    Skipped,
    NotModified,
    NoNewItems,
    Delivered { delivered: usize, total: usize },
}

/// End-to-end pipeline for one feed: reload config, fetch, dedup, format,
/// dispatch, persist progress. One instance is shared by every scheduled
/// feed; all per-feed state lives in the store.
pub struct FeedWorker {
    pool: DbPool,
    vault: Arc<TokenVault>,
    fetcher: FeedFetcher,
    formatter: Formatter,
    dispatcher: Arc<Dispatcher>,
    dry_run: bool,
    initial_backfill: Option<usize>,
}

impl FeedWorker {
    pub fn new(
        pool: DbPool,
        vault: Arc<TokenVault>,
        dispatcher: Arc<Dispatcher>,
        dry_run: bool,
        initial_backfill: Option<usize>,
    ) -> FeedWorker {
        FeedWorker {
            pool,
            vault,
            fetcher: FeedFetcher::new(),
            formatter: Formatter::new(),
            dispatcher,
            dry_run,
            initial_backfill,
        }
    }

    /// Scheduler entry point. Errors never escape: every failure is scoped
    /// to this run and the next tick retries naturally.
    pub async fn process(&self, feed_id: i32) {
        match tokio::time::timeout(PROCESS_TIMEOUT, self.process_inner(feed_id)).await {
            Ok(Ok(outcome)) => log::info!("Feed {feed_id} run finished: {outcome:?}"),
            Ok(Err(e)) => log::error!("Feed {feed_id} run failed: {e}"),
            Err(_) => log::error!("Feed {feed_id} run exceeded {PROCESS_TIMEOUT:?} deadline"),
        }
    }

    pub async fn process_inner(&self, feed_id: i32) -> AppResult<RunOutcome> {
        // Reload the authoritative row; the scheduler snapshot may be stale.
        let (context, fetch_proxy) = {
            let mut conn = self.pool.get()?;
            let Some(context) = Feed::load_context(&mut conn, feed_id)? else {
                log::info!("Feed {feed_id} no longer exists, skipping");
                return Ok(RunOutcome::Skipped);
            };
            if !context.feed.enabled {
                log::info!("Feed {feed_id} is disabled, skipping");
                return Ok(RunOutcome::Skipped);
            }
            let fetch_proxy =
                resolve_proxy(&mut conn, &context, ProxyPurpose::Rss)?;
            (context, fetch_proxy)
        };
        let feed = &context.feed;

        let outcome = self
            .fetcher
            .fetch(
                &feed.url,
                feed.etag.as_deref(),
                feed.last_modified.as_deref(),
                fetch_proxy.as_ref(),
            )
            .await?;

        let FetchOutcome {
            feed: fetched,
            etag,
            last_modified,
        } = outcome;

        let Some(fetched) = fetched else {
            log::info!("Feed {feed_id} not modified");
            if !self.dry_run {
                let mut conn = self.pool.get()?;
                Feed::mark_fetched(&mut conn, feed_id, etag.as_deref(), last_modified.as_deref())?;
            }
            return Ok(RunOutcome::NotModified);
        };

        let selection = {
            let mut conn = self.pool.get()?;
            dedup::select_new(&fetched, |fingerprint| {
                ProcessedItem::is_processed(&mut conn, feed_id, fingerprint)
            })?
        };

        if selection.items.is_empty() {
            log::info!("Feed {feed_id} has no new items");
            if !self.dry_run {
                let mut conn = self.pool.get()?;
                let hash = selection
                    .high_water
                    .as_deref()
                    .or(feed.last_processed_item_hash.as_deref());
                Feed::mark_progress(
                    &mut conn,
                    feed_id,
                    hash,
                    etag.as_deref(),
                    last_modified.as_deref(),
                )?;
            }
            return Ok(RunOutcome::NoNewItems);
        }

        let mut new_items = selection.items;
        let total = new_items.len();
        log::info!("Feed {feed_id}: {total} new items");

        let bot_id = feed
            .bot_id
            .ok_or_else(|| AppError::invalid_input("bot_id", "feed has no bot identity"))?;
        let token = {
            let mut conn = self.pool.get()?;
            self.vault.resolve(&mut conn, bot_id)?
        };

        let dispatch_proxy = {
            let mut conn = self.pool.get()?;
            resolve_proxy(&mut conn, &context, ProxyPurpose::Telegram)?
        };

        // Bounded first-run backfill: deliver only the newest N, suppress
        // the older ones so they do not resurface on the next pass.
        if feed.last_processed_item_hash.is_none() {
            if let Some(limit) = self.initial_backfill {
                if new_items.len() > limit {
                    let skipped = new_items.len() - limit;
                    log::info!(
                        "Feed {feed_id}: first run, suppressing {skipped} items beyond backfill limit {limit}"
                    );
                    let suppressed: Vec<_> = new_items.drain(..skipped).collect();
                    if !self.dry_run {
                        let mut conn = self.pool.get()?;
                        for (_, fingerprint) in &suppressed {
                            ProcessedItem::mark(&mut conn, feed_id, fingerprint)?;
                        }
                    }
                }
            }
        }

        let profile_config = profile_config(&context);

        let mut last_delivered: Option<String> = None;
        let mut delivered = 0usize;
        let mut dispatch_failure: Option<AppError> = None;

        for (item, fingerprint) in &new_items {
            let parts = self
                .formatter
                .format(item, feed, profile_config.as_ref())
                .await;

            if self.dry_run {
                log::info!(
                    "[DRY RUN] Feed {feed_id}: would send {} part(s) for '{}'",
                    parts.len(),
                    item.title
                );
                continue;
            }

            match self
                .dispatcher
                .send(&token, &feed.chat_id, &parts, dispatch_proxy.as_ref())
                .await
            {
                Ok(()) => {
                    let mut conn = self.pool.get()?;
                    ProcessedItem::mark(&mut conn, feed_id, fingerprint)?;
                    last_delivered = Some(fingerprint.clone());
                    delivered += 1;
                }
                Err(e) => {
                    log::error!("Feed {feed_id}: dispatch failed for '{}': {e}", item.title);
                    dispatch_failure = Some(e.into());
                    break;
                }
            }
        }

        if !self.dry_run {
            // Progress reflects the last item actually delivered; with none
            // delivered the high-water keeps the cursor moving, else the
            // previous value stands.
            let hash = last_delivered
                .as_deref()
                .or(selection.high_water.as_deref())
                .or(feed.last_processed_item_hash.as_deref());
            let mut conn = self.pool.get()?;
            Feed::mark_progress(
                &mut conn,
                feed_id,
                hash,
                etag.as_deref(),
                last_modified.as_deref(),
            )?;
        }

        match dispatch_failure {
            Some(err) => Err(err),
            None => Ok(RunOutcome::Delivered { delivered, total }),
        }
    }
}

/// Feed-specific proxy when set, else the flagged default for the purpose.
fn resolve_proxy(
    conn: &mut diesel::SqliteConnection,
    context: &FeedContext,
    purpose: ProxyPurpose,
) -> AppResult<Option<Proxy>> {
    if let Some(proxy) = &context.proxy {
        return Ok(Some(proxy.clone()));
    }
    match Proxy::default_for(conn, purpose) {
        Ok(proxy) => Ok(proxy),
        Err(e) => {
            log::warn!("Failed to resolve default proxy: {e}");
            Ok(None)
        }
    }
}

/// A broken profile config degrades to defaults rather than failing the run.
fn profile_config(context: &FeedContext) -> Option<FormatProfileConfig> {
    let profile = context.profile.as_ref()?;
    match profile.config() {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!(
                "Formatting profile {} is invalid, using defaults: {e}",
                profile.id
            );
            None
        }
    }
}
