//! Batch executors.
//!
//! A [`BatchFetcher`] answers an ordered list of keys with one store call.
//! The result has exactly one slot per input key, in input order, with `None`
//! for keys that matched no row. Duplicate keys are fetched once and answered
//! in every slot they occupy.

use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

use async_trait::async_trait;
use mondial_core::{City, Keyed, MondialResult, Province, SqlValue};
use tracing::{debug, info};

use crate::mapping::{map_rows, FromRow};
use crate::{PlanBuilder, SharedStore};

/// Fetches values of one relation by key.
#[async_trait]
pub trait BatchFetcher<V: Send + 'static>: Send + Sync {
    /// Relation name this fetcher answers for ("City", "Province").
    fn relation(&self) -> &str;

    /// Fetch all `keys` in one call. `result.len() == keys.len()`.
    async fn fetch(&self, keys: &[String]) -> MondialResult<Vec<Option<V>>>;

    /// Fetch a single key immediately.
    async fn fetch_one(&self, key: &str) -> MondialResult<Option<V>> {
        let mut results = self.fetch(&[key.to_string()]).await?;
        Ok(results.pop().flatten())
    }
}

/// SQL-backed batch executor for one keyed table.
pub struct SqlBatchFetcher<T> {
    store: SharedStore,
    relation: &'static str,
    select_sql: &'static str,
    key_column: &'static str,
    _entity: PhantomData<fn() -> T>,
}

pub type CityFetcher = SqlBatchFetcher<City>;
pub type ProvinceFetcher = SqlBatchFetcher<Province>;

impl SqlBatchFetcher<City> {
    /// Executor for the "City" relation.
    pub fn cities(store: SharedStore) -> Self {
        Self::new(
            store,
            "City",
            "SELECT name, population, latitude, longitude, elevation, province FROM city",
            "name",
        )
    }
}

impl SqlBatchFetcher<Province> {
    /// Executor for the "Province" relation.
    pub fn provinces(store: SharedStore) -> Self {
        Self::new(
            store,
            "Province",
            "SELECT name, population, capital, area FROM province",
            "name",
        )
    }
}

impl<T> SqlBatchFetcher<T> {
    /// `select_sql` must not contain a `WHERE` clause; the key predicate is
    /// appended to it.
    pub fn new(
        store: SharedStore,
        relation: &'static str,
        select_sql: &'static str,
        key_column: &'static str,
    ) -> Self {
        Self {
            store,
            relation,
            select_sql,
            key_column,
            _entity: PhantomData,
        }
    }
}

/// Distinct keys in first-seen order.
pub fn dedup_keys(keys: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(keys.len());
    keys.iter()
        .filter(|key| seen.insert(key.as_str()))
        .cloned()
        .collect()
}

#[async_trait]
impl<T> BatchFetcher<T> for SqlBatchFetcher<T>
where
    T: FromRow + Keyed + Clone + Send + Sync + 'static,
{
    fn relation(&self) -> &str {
        self.relation
    }

    async fn fetch(&self, keys: &[String]) -> MondialResult<Vec<Option<T>>> {
        if keys.is_empty() {
            debug!(relation = self.relation, "empty key set, skipping store");
            return Ok(Vec::new());
        }

        let distinct = dedup_keys(keys);
        let mut builder = PlanBuilder::new(self.select_sql);
        builder.and_where_in(
            self.key_column,
            distinct.iter().map(|key| SqlValue::from(key.as_str())),
        );
        let plan = builder.build()?;
        debug!(relation = self.relation, sql = %plan.sql(), "batch query");

        let rows = self.store.query(&plan).await?;
        let entities: Vec<T> = map_rows(&rows)?;

        let by_key: HashMap<String, T> = entities
            .into_iter()
            .map(|entity| (entity.natural_key().to_string(), entity))
            .collect();

        info!(
            relation = self.relation,
            keys = keys.len(),
            distinct = distinct.len(),
            found = by_key.len(),
            "batch fetched"
        );

        Ok(keys.iter().map(|key| by_key.get(key).cloned()).collect())
    }

    async fn fetch_one(&self, key: &str) -> MondialResult<Option<T>> {
        let mut builder = PlanBuilder::new(self.select_sql);
        builder.and_where(
            &format!("{} = ?", self.key_column),
            [SqlValue::from(key)],
        );
        let plan = builder.build()?;
        debug!(relation = self.relation, sql = %plan.sql(), "direct query");

        let rows = self.store.query(&plan).await?;
        let entities: Vec<T> = map_rows(&rows)?;
        Ok(entities
            .into_iter()
            .find(|entity| entity.natural_key() == key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{QueryPlan, Store};
    use mondial_core::{MondialError, Row};
    use std::sync::{Arc, Mutex};

    /// Answers queries from a fixed row set, filtering on string binds.
    struct RowStore {
        rows: Vec<Row>,
        calls: Mutex<Vec<QueryPlan>>,
        fail: bool,
    }

    impl RowStore {
        fn new(rows: Vec<Row>) -> Arc<Self> {
            Arc::new(Self {
                rows,
                calls: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                rows: Vec::new(),
                calls: Mutex::new(Vec::new()),
                fail: true,
            })
        }

        fn calls(&self) -> Vec<QueryPlan> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Store for RowStore {
        async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>> {
            self.calls.lock().unwrap().push(plan.clone());
            if self.fail {
                return Err(MondialError::fetch_failure("connection reset"));
            }
            Ok(self
                .rows
                .iter()
                .filter(|row| {
                    row.get("name")
                        .map(|name| plan.binds().contains(name))
                        .unwrap_or(false)
                })
                .cloned()
                .collect())
        }

        async fn execute(&self, _plan: &QueryPlan) -> MondialResult<u64> {
            Ok(0)
        }
    }

    fn city(name: &str, population: i64) -> Row {
        Row::new()
            .with("name", name)
            .with("population", population)
            .with("latitude", SqlValue::Null)
            .with("longitude", SqlValue::Null)
            .with("elevation", SqlValue::Null)
            .with("province", SqlValue::Null)
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fetch_preserves_order_and_absent_slots() {
        let store = RowStore::new(vec![city("Paris", 2_249_975), city("Madrid", 3_277_451)]);
        let fetcher = CityFetcher::cities(store.clone());

        let result = fetcher
            .fetch(&keys(&["Paris", "Unknown", "Madrid"]))
            .await
            .unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(result[0].as_ref().unwrap().population, Some(2_249_975));
        assert!(result[1].is_none());
        assert_eq!(result[2].as_ref().unwrap().name, "Madrid");
        assert_eq!(store.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_empty_skips_store() {
        let store = RowStore::new(vec![]);
        let fetcher = CityFetcher::cities(store.clone());
        assert!(fetcher.fetch(&[]).await.unwrap().is_empty());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_duplicates_bound_once() {
        let store = RowStore::new(vec![city("Bern", 133_115)]);
        let fetcher = CityFetcher::cities(store.clone());

        let result = fetcher.fetch(&keys(&["Bern", "Bern"])).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[0], result[1]);

        let calls = store.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].binds(), &[SqlValue::from("Bern")]);
        assert!(calls[0].sql().ends_with("WHERE name IN (?)"));
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_batch() {
        let fetcher = CityFetcher::cities(RowStore::failing());
        let err = fetcher.fetch(&keys(&["Paris", "Madrid"])).await.unwrap_err();
        assert!(err.is_fetch_failure());
    }

    #[tokio::test]
    async fn test_mapping_failure_fails_batch() {
        let store = RowStore::new(vec![Row::new().with("name", "Paris")]);
        let fetcher = CityFetcher::cities(store);
        assert!(matches!(
            fetcher.fetch(&keys(&["Paris"])).await,
            Err(MondialError::Mapping(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_one_direct_query() {
        let province = Row::new()
            .with("name", "Bern")
            .with("population", 1_039_474i64)
            .with("capital", "Bern")
            .with("area", 5959.0);
        let store = RowStore::new(vec![province]);
        let fetcher = ProvinceFetcher::provinces(store.clone());

        let found = fetcher.fetch_one("Bern").await.unwrap().unwrap();
        assert_eq!(found.capital.as_deref(), Some("Bern"));
        assert!(fetcher.fetch_one("Zug").await.unwrap().is_none());

        let calls = store.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].sql().ends_with("WHERE name = ?"));
        assert_eq!(fetcher.relation(), "Province");
    }

    #[test]
    fn test_dedup_keys_keeps_first_seen_order() {
        assert_eq!(
            dedup_keys(&keys(&["b", "a", "b", "c", "a"])),
            keys(&["b", "a", "c"])
        );
    }
}
