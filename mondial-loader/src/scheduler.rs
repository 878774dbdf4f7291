//! Batch scheduler.
//!
//! A [`BatchLoader`] collects keys between ticks and answers them with as few
//! batch calls as possible. `load` never blocks: it registers the key and hands
//! back a shared future. `dispatch` is the tick boundary; it drains the pending
//! keys, de-duplicates them, splits them into sub-batches of at most
//! `max_batch_size`, runs those with bounded parallelism and wakes every waiter
//! with its key's slot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures_util::future::{self, FutureExt};
use futures_util::stream::{self, StreamExt};
use mondial_core::{LoaderConfig, LoaderError, MondialResult};
use mondial_storage::{dedup_keys, BatchFetcher};
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, warn};

use crate::cache::{CacheStats, LoadFuture, LoadResult, RequestCache};

/// Where a loader is in its collect/dispatch cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderPhase {
    /// Accepting keys for the next batch.
    Collecting,
    /// A tick is executing the pending batch.
    Dispatching,
    /// The last tick completed and nothing new is pending.
    Fulfilled,
}

/// Summary of one dispatch tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub relation: String,
    /// Pending loads drained by this tick, repeats included.
    pub keys_requested: usize,
    pub distinct_keys: usize,
    pub batches_executed: usize,
    pub batches_failed: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.keys_requested == 0
    }
}

struct PendingLoad<V> {
    key: String,
    tx: oneshot::Sender<LoadResult<V>>,
}

struct Queue<V> {
    phase: LoaderPhase,
    pending: Vec<PendingLoad<V>>,
}

/// Batching, de-duplicating loader for one relation in one request scope.
pub struct BatchLoader<V> {
    relation: String,
    fetcher: Arc<dyn BatchFetcher<V>>,
    config: LoaderConfig,
    cache: RequestCache<V>,
    queue: Mutex<Queue<V>>,
    wakeup: Option<Arc<Notify>>,
}

impl<V> BatchLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(fetcher: Arc<dyn BatchFetcher<V>>, config: LoaderConfig) -> Self {
        Self {
            relation: fetcher.relation().to_string(),
            fetcher,
            config,
            cache: RequestCache::new(),
            queue: Mutex::new(Queue {
                phase: LoaderPhase::Collecting,
                pending: Vec::new(),
            }),
            wakeup: None,
        }
    }

    /// Signal `wakeup` whenever a key is queued.
    pub fn with_wakeup(mut self, wakeup: Arc<Notify>) -> Self {
        self.wakeup = Some(wakeup);
        self
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The executor behind this loader, for unscheduled single-key fetches.
    pub fn fetcher(&self) -> Arc<dyn BatchFetcher<V>> {
        self.fetcher.clone()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Queue<V>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request `key`. The returned future resolves after the next dispatch.
    ///
    /// With caching enabled a key already requested in this scope returns the
    /// existing future and is not queued again.
    pub fn load(&self, key: impl Into<String>) -> LoadFuture<V> {
        let key = key.into();
        if self.config.caching_enabled {
            self.cache.get(&key, || self.enqueue(key.clone()))
        } else {
            self.enqueue(key)
        }
    }

    pub fn load_many<I, K>(&self, keys: I) -> Vec<LoadFuture<V>>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        keys.into_iter().map(|key| self.load(key)).collect()
    }

    fn enqueue(&self, key: String) -> LoadFuture<V> {
        let (tx, rx) = oneshot::channel();
        {
            let mut queue = self.lock_queue();
            queue.phase = LoaderPhase::Collecting;
            queue.pending.push(PendingLoad {
                key: key.clone(),
                tx,
            });
        }
        debug!(relation = %self.relation, key = %key, "key collected");
        if let Some(wakeup) = &self.wakeup {
            wakeup.notify_waiters();
        }

        async move {
            rx.await
                .unwrap_or_else(|_| Err(LoaderError::Abandoned { key }.into()))
        }
        .boxed()
        .shared()
    }

    /// Seed the cache with a known value. Returns false if the key was
    /// already requested or caching is disabled.
    pub fn prime(&self, key: impl Into<String>, value: V) -> bool {
        if !self.config.caching_enabled {
            return false;
        }
        let ready = future::ready(Ok(Some(value))).boxed().shared();
        self.cache.insert_if_absent(&key.into(), ready)
    }

    /// Forget `key`, so the next `load` fetches it again.
    pub fn clear(&self, key: &str) -> bool {
        self.cache.clear(key)
    }

    pub fn clear_all(&self) {
        self.cache.clear_all();
    }

    pub fn phase(&self) -> LoaderPhase {
        self.lock_queue().phase
    }

    pub fn pending_len(&self) -> usize {
        self.lock_queue().pending.len()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Run one tick: execute everything pending and resolve its waiters.
    ///
    /// Keys queued while this tick runs wait for the next one.
    pub async fn dispatch(&self) -> DispatchReport {
        let pending = {
            let mut queue = self.lock_queue();
            if queue.pending.is_empty() {
                return DispatchReport {
                    relation: self.relation.clone(),
                    ..DispatchReport::default()
                };
            }
            queue.phase = LoaderPhase::Dispatching;
            std::mem::take(&mut queue.pending)
        };

        let requested: Vec<String> = pending.iter().map(|load| load.key.clone()).collect();
        let distinct = dedup_keys(&requested);
        let chunks: Vec<Vec<String>> = distinct
            .chunks(self.config.max_batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect();

        let mut report = DispatchReport {
            relation: self.relation.clone(),
            keys_requested: requested.len(),
            distinct_keys: distinct.len(),
            batches_executed: chunks.len(),
            batches_failed: 0,
        };
        info!(
            relation = %self.relation,
            keys = report.keys_requested,
            distinct = report.distinct_keys,
            batches = report.batches_executed,
            "dispatching batch"
        );

        let outcomes: Vec<(Vec<String>, MondialResult<Vec<Option<V>>>)> = stream::iter(chunks)
            .map(|chunk| async move {
                let outcome = self.run_batch(&chunk).await;
                (chunk, outcome)
            })
            .buffer_unordered(self.config.max_concurrent_batches.max(1))
            .collect()
            .await;

        let mut resolved: HashMap<String, LoadResult<V>> = HashMap::with_capacity(distinct.len());
        for (chunk, outcome) in outcomes {
            match outcome {
                Ok(values) => {
                    resolved.extend(chunk.into_iter().zip(values.into_iter().map(Ok)));
                }
                Err(err) => {
                    report.batches_failed += 1;
                    warn!(relation = %self.relation, keys = chunk.len(), error = %err, "batch failed");
                    resolved.extend(chunk.into_iter().map(|key| (key, Err(err.clone()))));
                }
            }
        }

        for PendingLoad { key, tx } in pending {
            let result = match resolved.get(&key) {
                Some(result) => result.clone(),
                None => Err(LoaderError::Abandoned { key }.into()),
            };
            // A dropped receiver only means nobody awaits this key any more.
            let _ = tx.send(result);
        }

        let mut queue = self.lock_queue();
        if queue.pending.is_empty() {
            queue.phase = LoaderPhase::Fulfilled;
        }
        report
    }

    async fn run_batch(&self, keys: &[String]) -> MondialResult<Vec<Option<V>>> {
        let values = self.fetcher.fetch(keys).await?;
        if values.len() != keys.len() {
            return Err(LoaderError::ResultLengthMismatch {
                relation: self.relation.clone(),
                expected: keys.len(),
                got: values.len(),
            }
            .into());
        }
        Ok(values)
    }
}

/// Type-erased view of a loader, so loaders of different value types can be
/// flushed together.
#[async_trait]
pub trait Dispatch: Send + Sync {
    fn relation(&self) -> &str;

    fn pending_len(&self) -> usize;

    async fn dispatch_pending(&self) -> DispatchReport;
}

#[async_trait]
impl<V> Dispatch for BatchLoader<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn relation(&self) -> &str {
        &self.relation
    }

    fn pending_len(&self) -> usize {
        BatchLoader::pending_len(self)
    }

    async fn dispatch_pending(&self) -> DispatchReport {
        self.dispatch().await
    }
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    struct Echo;

    #[async_trait]
    impl BatchFetcher<String> for Echo {
        fn relation(&self) -> &str {
            "Echo"
        }

        async fn fetch(&self, keys: &[String]) -> MondialResult<Vec<Option<String>>> {
            Ok(keys.iter().cloned().map(Some).collect())
        }
    }

    proptest! {
        #[test]
        fn prop_every_load_gets_its_own_key(
            keys in proptest::collection::vec("[a-e]{1,2}", 0..40),
            batch_size in 1usize..8,
            caching in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            runtime.block_on(async {
                let config = LoaderConfig::default()
                    .with_max_batch_size(batch_size)
                    .with_caching(caching);
                let loader = BatchLoader::new(Arc::new(Echo), config);
                let futures = loader.load_many(keys.clone());
                let report = loader.dispatch().await;

                let distinct = dedup_keys(&keys).len();
                prop_assert_eq!(report.distinct_keys, distinct);
                prop_assert_eq!(report.batches_executed, distinct.div_ceil(batch_size));

                for (key, fut) in keys.iter().zip(futures) {
                    prop_assert_eq!(fut.await.unwrap(), Some(key.clone()));
                }
                Ok(())
            })?;
        }
    }
}
