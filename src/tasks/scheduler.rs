use crate::config::DEFAULT_FREQUENCY_SECONDS;
use crate::db::now_epoch;
use crate::models::feed::Feed;
use futures::future::BoxFuture;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Duration, Instant};

/// Snapshot of the scheduling-relevant feed fields. The worker reloads the
/// authoritative row on every run; this only drives timing and logging.
#[derive(Debug, Clone)]
pub struct ScheduledFeed {
    pub id: i32,
    pub url: String,
    pub frequency: Duration,
}

pub type TaskFn = Arc<dyn Fn(ScheduledFeed) -> BoxFuture<'static, ()> + Send + Sync>;

struct Entry {
    due: Instant,
    feed: ScheduledFeed,
    task: TaskFn,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

// BinaryHeap is a max-heap; reversed ordering pops the earliest due time.
impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.due.cmp(&self.due)
    }
}

struct Inner {
    heap: Mutex<BinaryHeap<Entry>>,
    notify: Notify,
}

impl Inner {
    fn push(&self, entry: Entry) {
        self.heap.lock().expect("scheduler heap lock poisoned").push(entry);
        // Wake the loop so it can re-aim its timer at the new minimum.
        self.notify.notify_one();
    }
}

/// Min-heap timer loop that fires one worker run per feed per interval.
/// A feed is re-queued only when its run completes, at `completion +
/// frequency`, so a run slower than the interval skips ticks instead of
/// stacking a second in-flight run.
pub struct Scheduler {
    inner: Arc<Inner>,
    default_frequency_seconds: i32,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Self::with_default_frequency(DEFAULT_FREQUENCY_SECONDS)
    }

    pub fn with_default_frequency(default_frequency_seconds: i32) -> Scheduler {
        Scheduler {
            inner: Arc::new(Inner {
                heap: Mutex::new(BinaryHeap::new()),
                notify: Notify::new(),
            }),
            default_frequency_seconds: default_frequency_seconds.max(1),
        }
    }

    /// Registers a feed. First run lands at `last_fetched_at + frequency`
    /// when that is still in the future, one second out when overdue, and
    /// five seconds out for never-fetched feeds so startup load spreads.
    pub fn add(&self, feed: &Feed, task: TaskFn) {
        let mut frequency_seconds = feed.frequency_seconds;
        if frequency_seconds <= 0 {
            log::warn!(
                "Feed {} ({}) has frequency {}s, defaulting to {}s",
                feed.id,
                feed.url,
                frequency_seconds,
                self.default_frequency_seconds
            );
            frequency_seconds = self.default_frequency_seconds;
        }
        let frequency = Duration::from_secs(frequency_seconds as u64);

        let delay = match feed.last_fetched_at {
            Some(last) => {
                let next_epoch = i64::from(last) + i64::from(frequency_seconds);
                let overdue_in = next_epoch - i64::from(now_epoch());
                Duration::from_secs(overdue_in.max(1) as u64)
            }
            None => Duration::from_secs(5),
        };

        let scheduled = ScheduledFeed {
            id: feed.id,
            url: feed.url.clone(),
            frequency,
        };
        log::info!(
            "Feed {} ({}) scheduled, first run in {delay:?}",
            feed.id,
            feed.url
        );
        self.inner.push(Entry {
            due: Instant::now() + delay,
            feed: scheduled,
            task,
        });
    }

    /// Dispatch loop. Returns when `shutdown` flips; in-flight runs are not
    /// interrupted (each carries its own deadline).
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        log::info!("Scheduler started");
        loop {
            let next_due = {
                let heap = self.inner.heap.lock().expect("scheduler heap lock poisoned");
                heap.peek().map(|e| e.due)
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = self.inner.notify.notified() => continue,
                _ = async {
                    match next_due {
                        Some(due) => sleep_until(due).await,
                        // Empty heap: idle until a push wakes us.
                        None => std::future::pending::<()>().await,
                    }
                } => self.fire_due(),
            }
        }
        log::info!("Scheduler stopped");
    }

    fn fire_due(&self) {
        let now = Instant::now();
        loop {
            let entry = {
                let mut heap = self.inner.heap.lock().expect("scheduler heap lock poisoned");
                match heap.peek() {
                    Some(head) if head.due <= now => heap.pop(),
                    _ => None,
                }
            };
            let Some(entry) = entry else { break };

            log::debug!("Firing scheduled run for feed {}", entry.feed.id);
            let inner = self.inner.clone();
            tokio::spawn(async move {
                let Entry { feed, task, .. } = entry;
                (task)(feed.clone()).await;

                let due = Instant::now() + feed.frequency;
                log::debug!(
                    "Feed {} re-queued, next run in {:?}",
                    feed.id,
                    feed.frequency
                );
                inner.push(Entry { due, feed, task });
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn feed(id: i32, frequency_seconds: i32, last_fetched_at: Option<i32>) -> Feed {
        Feed {
            id,
            url: format!("https://example.com/{id}"),
            user_title: None,
            frequency_seconds,
            bot_id: None,
            chat_id: "1".into(),
            last_processed_item_hash: None,
            last_fetched_at,
            proxy_id: None,
            formatting_profile_id: None,
            enabled: true,
            etag: None,
            last_modified: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    fn counting_task(counter: Arc<AtomicUsize>) -> TaskFn {
        Arc::new(move |_feed| {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_fetched_feed_fires_after_stagger() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add(&feed(1, 3600, None), counting_task(counter.clone()));

        let (_tx, rx) = watch::channel(false);
        let sched = scheduler.clone();
        tokio::spawn(async move { sched.run(rx).await });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_refire() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add(&feed(1, 10, None), counting_task(counter.clone()));

        let (_tx, rx) = watch::channel(false);
        let sched = scheduler.clone();
        tokio::spawn(async move { sched.run(rx).await });

        // First run at +5s, then every ~10s after each completion.
        tokio::time::sleep(Duration::from_secs(36)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_task_skips_ticks_instead_of_stacking() {
        let scheduler = Arc::new(Scheduler::new());
        let starts: Arc<Mutex<Vec<Instant>>> = Arc::new(Mutex::new(Vec::new()));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_in_flight = Arc::new(AtomicUsize::new(0));

        let task: TaskFn = {
            let starts = starts.clone();
            let in_flight = in_flight.clone();
            let max_in_flight = max_in_flight.clone();
            Arc::new(move |_feed| {
                let starts = starts.clone();
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                Box::pin(async move {
                    starts.lock().unwrap().push(Instant::now());
                    let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_in_flight.fetch_max(current, Ordering::SeqCst);
                    // Run takes 90s against a 60s frequency.
                    tokio::time::sleep(Duration::from_secs(90)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
            })
        };

        let begin = Instant::now();
        scheduler.add(&feed(1, 60, None), task);

        let (_tx, rx) = watch::channel(false);
        let sched = Arc::new(scheduler);
        let sched2 = sched.clone();
        tokio::spawn(async move { sched2.run(rx).await });

        tokio::time::sleep(Duration::from_secs(400)).await;

        let starts = starts.lock().unwrap();
        // First run at +5s, completes +95s, next at +155s, completes +245s,
        // next at +305s. A stacked tick at +65s would show up here.
        assert!(starts.len() >= 3);
        let offsets: Vec<u64> = starts
            .iter()
            .map(|s| s.duration_since(begin).as_secs())
            .collect();
        assert_eq!(offsets[0], 5);
        assert!(offsets[1] >= 155 && offsets[1] < 160, "got {offsets:?}");
        assert_eq!(max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_frequency_coerced_to_default() {
        let scheduler = Arc::new(Scheduler::with_default_frequency(30));
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add(&feed(1, 0, None), counting_task(counter.clone()));

        let (_tx, rx) = watch::channel(false);
        let sched = scheduler.clone();
        tokio::spawn(async move { sched.run(rx).await });

        // First run at +5s, then every 30s from completion.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overdue_feed_runs_soon() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        // Fetched long ago: next run is overdue, so it lands in one second.
        scheduler.add(
            &feed(1, 60, Some(now_epoch() - 3600)),
            counting_task(counter.clone()),
        );

        let (_tx, rx) = watch::channel(false);
        let sched = scheduler.clone();
        tokio::spawn(async move { sched.run(rx).await });

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_firing() {
        let scheduler = Arc::new(Scheduler::new());
        let counter = Arc::new(AtomicUsize::new(0));
        scheduler.add(&feed(1, 10, None), counting_task(counter.clone()));

        let (tx, rx) = watch::channel(false);
        let sched = scheduler.clone();
        let handle = tokio::spawn(async move { sched.run(rx).await });

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        tx.send(true).unwrap();
        let _ = handle.await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
