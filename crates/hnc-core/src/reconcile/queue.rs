//! Queue plumbing between reconcilers.
//!
//! A [`Workqueue`] handle accepts keys without ever needing the forest lock;
//! the runner side deduplicates, guarantees single-writer-per-key, bounds
//! cross-key parallelism, and retries failures with exponential backoff. A
//! key enqueued while its reconcile is in flight is marked dirty and re-run
//! once the current pass finishes, so effects for one key stay ordered.

use crate::log::Topic;
use crate::reconcile::{AnchorKey, ObjectKey, Pending, ReconcileError};
use crate::log;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::mpsc;

const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_MAX: Duration = Duration::from_secs(300);

///
/// Workqueue
/// Cloneable enqueue handle. Sends never block and never fail while the
/// runner lives; keys enqueued after shutdown are dropped.
///

pub struct Workqueue<K> {
    tx: mpsc::UnboundedSender<K>,
}

impl<K> Clone for Workqueue<K> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<K: Debug> Workqueue<K> {
    pub fn add(&self, key: K) {
        if self.tx.send(key).is_err() {
            log!(Topic::Forest, DEBUG, "workqueue closed; key dropped");
        }
    }
}

///
/// WorkqueueRunner
/// Consumer side; owns the receiver plus a sender handle for retries.
///

pub struct WorkqueueRunner<K> {
    rx: mpsc::UnboundedReceiver<K>,
    tx: mpsc::UnboundedSender<K>,
}

#[must_use]
pub fn workqueue<K>() -> (Workqueue<K>, WorkqueueRunner<K>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Workqueue { tx: tx.clone() },
        WorkqueueRunner { rx, tx },
    )
}

impl<K> WorkqueueRunner<K>
where
    K: Clone + Debug + Eq + Hash + Send + Sync + 'static,
{
    /// Runs until the process shuts down. `handler` performs one reconcile;
    /// the [`Pending`] it returns is dispatched through `router`.
    pub async fn run<F, Fut>(mut self, concurrency: usize, router: Router, handler: F)
    where
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<Pending, ReconcileError>> + Send + 'static,
    {
        let concurrency = concurrency.max(1);
        let mut in_flight: HashSet<K> = HashSet::new();
        let mut dirty: HashSet<K> = HashSet::new();
        let mut waiting: VecDeque<K> = VecDeque::new();
        let mut attempts: HashMap<K, u32> = HashMap::new();
        let mut tasks = FuturesUnordered::new();

        loop {
            // Fill free slots from the waiting line first so ordering is
            // fair across keys.
            while in_flight.len() < concurrency {
                let Some(key) = waiting.pop_front() else { break };
                if in_flight.insert(key.clone()) {
                    let fut = handler(key.clone());
                    tasks.push(async move { (key, fut.await) });
                }
            }

            tokio::select! {
                received = self.rx.recv() => {
                    let Some(key) = received else { break };
                    if in_flight.contains(&key) {
                        dirty.insert(key);
                    } else if !waiting.contains(&key) {
                        waiting.push_back(key);
                    }
                }

                Some((key, result)) = tasks.next(), if !tasks.is_empty() => {
                    in_flight.remove(&key);
                    match result {
                        Ok(pending) => {
                            attempts.remove(&key);
                            router.dispatch(pending);
                            if dirty.remove(&key) {
                                waiting.push_back(key);
                            }
                        }
                        Err(err) => {
                            let attempt = attempts.entry(key.clone()).or_insert(0);
                            *attempt += 1;
                            let delay = backoff_delay(*attempt);
                            log!(
                                Topic::Forest,
                                WARN,
                                "reconcile of {key:?} failed (attempt {attempt}), retrying in {delay:?}: {err}",
                            );
                            dirty.remove(&key);
                            let tx = self.tx.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = tx.send(key);
                            });
                        }
                    }
                }
            }
        }
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(16).saturating_sub(1);
    BACKOFF_BASE.saturating_mul(factor).min(BACKOFF_MAX)
}

///
/// Router
/// Holds the enqueue handles of every queue so a reconcile outcome can be
/// fanned out after the forest lock is released.
///

#[derive(Clone)]
pub struct Router {
    pub namespaces: Workqueue<String>,
    pub anchors: Workqueue<AnchorKey>,
    pub objects: Workqueue<ObjectKey>,
    pub config: Workqueue<()>,
}

impl Router {
    pub fn dispatch(&self, mut pending: Pending) {
        pending.dedup();
        for ns in pending.namespaces {
            self.namespaces.add(ns);
        }
        for anchor in pending.anchors {
            self.anchors.add(anchor);
        }
        for object in pending.objects {
            self.objects.add(object);
        }
        if pending.config {
            self.config.add(());
        }
    }
}

/// Builds the four queues and their runners in one step.
#[must_use]
pub fn build_queues() -> (Router, Runners) {
    let (namespaces, namespaces_rx) = workqueue();
    let (anchors, anchors_rx) = workqueue();
    let (objects, objects_rx) = workqueue();
    let (config, config_rx) = workqueue();

    (
        Router {
            namespaces,
            anchors,
            objects,
            config,
        },
        Runners {
            namespaces: namespaces_rx,
            anchors: anchors_rx,
            objects: objects_rx,
            config: config_rx,
        },
    )
}

///
/// Runners
///

pub struct Runners {
    pub namespaces: WorkqueueRunner<String>,
    pub anchors: WorkqueueRunner<AnchorKey>,
    pub objects: WorkqueueRunner<ObjectKey>,
    pub config: WorkqueueRunner<()>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn keys_run_once_per_enqueue_and_retry_on_failure() {
        let (router, runners) = build_queues();
        let count = Arc::new(AtomicUsize::new(0));
        let failures_left = Arc::new(AtomicUsize::new(1));

        let handle = {
            let count = Arc::clone(&count);
            let failures_left = Arc::clone(&failures_left);
            let dispatch_router = router.clone();
            tokio::spawn(runners.namespaces.run(4, dispatch_router, move |_ns: String| {
                let count = Arc::clone(&count);
                let failures_left = Arc::clone(&failures_left);
                async move {
                    if failures_left
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok()
                    {
                        return Err(ReconcileError::Cluster(
                            crate::cluster::ClusterError::Unavailable("flake".to_string()),
                        ));
                    }
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(Pending::default())
                }
            }))
        };

        router.namespaces.add("a".to_string());
        router.namespaces.add("b".to_string());

        for _ in 0..200 {
            if count.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Both keys eventually reconciled despite the injected failure.
        assert_eq!(count.load(Ordering::SeqCst), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn keys_enqueued_mid_flight_run_again_after_completion() {
        let (router, runners) = build_queues();
        let count = Arc::new(AtomicUsize::new(0));

        let handle = {
            let count = Arc::clone(&count);
            let dispatch_router = router.clone();
            tokio::spawn(runners.namespaces.run(2, dispatch_router, move |_ns: String| {
                let count = Arc::clone(&count);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok(Pending::default())
                }
            }))
        };

        router.namespaces.add("a".to_string());
        tokio::time::sleep(Duration::from_millis(10)).await;
        // Still in flight: this marks the key dirty instead of running a
        // second writer concurrently.
        router.namespaces.add("a".to_string());

        for _ in 0..200 {
            if count.load(Ordering::SeqCst) >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
        handle.abort();
    }
}
