//! Per-request loader registry.
//!
//! Built when a request scope starts, dropped when it ends. Loaders are looked
//! up by relation name; `dispatch_all` is the tick boundary the execution
//! engine calls once a resolution pass has collected its keys.
//!
//! Callers that run on other tasks hold a [`CallerGuard`] from
//! [`LoaderRegistry::enter`] so `run_to_completion` waits for the loads they
//! issue after waking.

use std::any::{type_name, Any};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mondial_core::{City, LoaderConfig, LoaderError, MondialResult, Province};
use mondial_storage::{BatchFetcher, SharedStore, SqlBatchFetcher};
use tokio::sync::Notify;
use tracing::{debug, info, info_span, Instrument, Span};
use uuid::Uuid;

use crate::cache::LoadFuture;
use crate::scheduler::{BatchLoader, Dispatch, DispatchReport};

pub const CITY: &str = "City";
pub const PROVINCE: &str = "Province";

struct Registered {
    dispatch: Arc<dyn Dispatch>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Outstanding callers and the signal raised when one leaves or a key is
/// queued.
#[derive(Default)]
struct Activity {
    callers: AtomicUsize,
    wakeup: Arc<Notify>,
}

/// Marks a caller that may still issue loads. Dropping it releases the
/// caller.
#[must_use = "the caller is released as soon as the guard is dropped"]
pub struct CallerGuard {
    activity: Arc<Activity>,
}

impl Drop for CallerGuard {
    fn drop(&mut self) {
        self.activity.callers.fetch_sub(1, Ordering::SeqCst);
        self.activity.wakeup.notify_waiters();
    }
}

/// Named loaders for one request scope.
pub struct LoaderRegistry {
    request_id: Uuid,
    config: LoaderConfig,
    span: Span,
    loaders: BTreeMap<String, Registered>,
    activity: Arc<Activity>,
}

impl LoaderRegistry {
    pub fn new(config: LoaderConfig) -> Self {
        let request_id = Uuid::now_v7();
        Self {
            request_id,
            config,
            span: info_span!("request", request_id = %request_id),
            loaders: BTreeMap::new(),
            activity: Arc::new(Activity::default()),
        }
    }

    /// Registry with the "City" and "Province" loaders over `store`.
    pub fn for_request(store: SharedStore, config: LoaderConfig) -> Self {
        let mut registry = Self::new(config);
        registry.register::<City>(Arc::new(SqlBatchFetcher::cities(store.clone())));
        registry.register::<Province>(Arc::new(SqlBatchFetcher::provinces(store)));
        registry
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Register a loader under its fetcher's relation name, replacing any
    /// loader already registered under that name.
    pub fn register<V>(&mut self, fetcher: Arc<dyn BatchFetcher<V>>) -> Arc<BatchLoader<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let loader = Arc::new(
            BatchLoader::new(fetcher, self.config.clone())
                .with_wakeup(self.activity.wakeup.clone()),
        );
        let relation = loader.relation().to_string();
        self.loaders.insert(
            relation,
            Registered {
                dispatch: loader.clone(),
                typed: loader.clone(),
            },
        );
        loader
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.loaders.keys().map(String::as_str)
    }

    /// The loader registered for `relation`, checked against the value type
    /// the caller expects.
    pub fn loader<V>(&self, relation: &str) -> MondialResult<Arc<BatchLoader<V>>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let registered = self
            .loaders
            .get(relation)
            .ok_or_else(|| LoaderError::UnknownRelation {
                relation: relation.to_string(),
            })?;

        registered
            .typed
            .clone()
            .downcast::<BatchLoader<V>>()
            .map_err(|_| {
                LoaderError::RelationTypeMismatch {
                    relation: relation.to_string(),
                    expected: type_name::<V>().to_string(),
                }
                .into()
            })
    }

    pub fn load<V>(&self, relation: &str, key: impl Into<String>) -> MondialResult<LoadFuture<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        Ok(self.loader::<V>(relation)?.load(key))
    }

    pub fn cities(&self) -> MondialResult<Arc<BatchLoader<City>>> {
        self.loader(CITY)
    }

    pub fn provinces(&self) -> MondialResult<Arc<BatchLoader<Province>>> {
        self.loader(PROVINCE)
    }

    /// Register a caller that may issue loads from another task. Take the
    /// guard before spawning the caller and move it into the task.
    pub fn enter(&self) -> CallerGuard {
        self.activity.callers.fetch_add(1, Ordering::SeqCst);
        CallerGuard {
            activity: self.activity.clone(),
        }
    }

    /// Callers holding a guard from [`enter`](Self::enter).
    pub fn active_callers(&self) -> usize {
        self.activity.callers.load(Ordering::SeqCst)
    }

    pub fn pending_len(&self) -> usize {
        self.loaders
            .values()
            .map(|registered| registered.dispatch.pending_len())
            .sum()
    }

    /// Flush every loader that has pending keys. Returns one report per
    /// loader that did work, in relation-name order.
    pub async fn dispatch_all(&self) -> Vec<DispatchReport> {
        let span = info_span!(parent: &self.span, "dispatch_all");
        async {
            let mut reports = Vec::new();
            for registered in self.loaders.values() {
                if registered.dispatch.pending_len() == 0 {
                    continue;
                }
                reports.push(registered.dispatch.dispatch_pending().await);
            }
            info!(loaders = reports.len(), "tick complete");
            reports
        }
        .instrument(span)
        .await
    }

    /// Dispatch until no loader has pending keys and no caller holds a
    /// guard. Loads issued by callers woken in one round are picked up by the
    /// next; while guarded callers are still running it waits for them to
    /// queue a key or leave.
    pub async fn run_to_completion(&self) -> Vec<DispatchReport> {
        let mut reports = Vec::new();
        loop {
            let notified = self.activity.wakeup.notified();
            tokio::pin!(notified);
            // Registered before the checks so a signal between them is kept.
            notified.as_mut().enable();

            if self.pending_len() > 0 {
                reports.extend(self.dispatch_all().await);
                tokio::task::yield_now().await;
                continue;
            }
            let callers = self.active_callers();
            if callers == 0 {
                break;
            }
            debug!(callers, "waiting for active callers");
            notified.await;
        }
        reports
    }
}
