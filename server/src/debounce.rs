//! Quiet-period coalescing of keyed events.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Collects events into a pending map and hands the whole map to `flush` once
/// no new event has arrived for `quiet`. A later event for the same key
/// replaces the earlier one, and every event restarts the quiet period.
pub struct Debouncer<K, V> {
    tx: mpsc::UnboundedSender<(K, V)>,
}

impl<K, V> Clone for Debouncer<K, V> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<K, V> Debouncer<K, V>
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
{
    /// Spawns the collecting task on the current tokio runtime. `flush` runs on
    /// the blocking pool, one batch at a time. The task ends, after flushing
    /// whatever is pending, once every handle is dropped.
    pub fn spawn<F>(quiet: Duration, flush: F) -> (Self, JoinHandle<()>)
    where
        F: Fn(HashMap<K, V>) + Send + Sync + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(rx, quiet, Arc::new(flush)));
        (Self { tx }, handle)
    }

    /// Queues an event. Returns `false` if the collecting task has stopped.
    pub fn notify(&self, key: K, value: V) -> bool {
        self.tx.send((key, value)).is_ok()
    }
}

async fn run<K, V, F>(mut rx: mpsc::UnboundedReceiver<(K, V)>, quiet: Duration, flush: Arc<F>)
where
    K: Eq + Hash + Send + 'static,
    V: Send + 'static,
    F: Fn(HashMap<K, V>) + Send + Sync + 'static,
{
    while let Some((key, value)) = rx.recv().await {
        let mut pending = HashMap::new();
        pending.insert(key, value);
        let closed = loop {
            match tokio::time::timeout(quiet, rx.recv()).await {
                Ok(Some((key, value))) => {
                    pending.insert(key, value);
                }
                Ok(None) => break true,
                Err(_) => break false,
            }
        };
        tracing::debug!(pending = pending.len(), "quiet period elapsed; flushing");
        let flush = flush.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || flush(pending)).await {
            tracing::error!(error = %e, "flush task failed");
        }
        if closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::sleep;

    type Flushed = Arc<Mutex<Vec<HashMap<&'static str, u32>>>>;

    fn recorder(quiet_ms: u64) -> (Debouncer<&'static str, u32>, Flushed, JoinHandle<()>) {
        let flushed: Flushed = Arc::new(Mutex::new(Vec::new()));
        let sink = flushed.clone();
        let (debouncer, handle) = Debouncer::spawn(Duration::from_millis(quiet_ms), move |batch| sink.lock().push(batch));
        (debouncer, flushed, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn new_events_restart_the_quiet_period() {
        let (debouncer, flushed, _handle) = recorder(500);
        debouncer.notify("a.md", 1);
        sleep(Duration::from_millis(300)).await;
        debouncer.notify("a.md", 2);
        sleep(Duration::from_millis(400)).await;
        // 700ms since the first event, only 400ms since the last
        assert!(flushed.lock().is_empty());

        sleep(Duration::from_millis(200)).await;
        let flushed = flushed.lock();
        assert_eq!(flushed.len(), 1);
        assert_eq!(flushed[0], HashMap::from([("a.md", 2)]));
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_flush_separately() {
        let (debouncer, flushed, _handle) = recorder(100);
        debouncer.notify("a.md", 1);
        debouncer.notify("b.md", 1);
        sleep(Duration::from_millis(150)).await;
        debouncer.notify("a.md", 3);
        sleep(Duration::from_millis(150)).await;

        let flushed = flushed.lock();
        assert_eq!(flushed.len(), 2);
        assert_eq!(flushed[0], HashMap::from([("a.md", 1), ("b.md", 1)]));
        assert_eq!(flushed[1], HashMap::from([("a.md", 3)]));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_flushes_pending() {
        let (debouncer, flushed, handle) = recorder(10_000);
        debouncer.notify("a.md", 1);
        drop(debouncer);
        handle.await.unwrap();
        assert_eq!(flushed.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_flush_does_not_stall_the_runtime() {
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let (debouncer, handle) = Debouncer::spawn(Duration::from_millis(50), move |batch: HashMap<&'static str, u32>| {
            let _ = started_tx.send(batch.len());
            let _ = release_rx.lock().recv();
        });
        debouncer.notify("a.md", 1);
        // the flush is parked until released, yet this single-threaded test keeps running
        assert_eq!(started_rx.recv().await, Some(1));
        release_tx.send(()).unwrap();
        drop(debouncer);
        handle.await.unwrap();
    }
}
