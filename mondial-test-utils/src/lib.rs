//! Mondial Test Utilities
//!
//! Shared test infrastructure for the Mondial workspace:
//! - `MockStore`, an in-memory store with call recording and failure injection
//! - Row fixtures for a handful of well-known places
//! - Proptest generators for keys and criteria
//! - Assertions on the error hierarchy

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

// Re-export core types for convenience
pub use mondial_core::{
    City, Continent, Country, CriteriaFilter, LoaderConfig, MondialError, MondialResult,
    PopulationRange, Province, QueryError, Row, SqlValue, StorageError,
};
pub use mondial_storage::{QueryPlan, SharedStore, Store};

// ============================================================================
// MOCK STORE
// ============================================================================

/// Custom answer for a query, used instead of the table lookup.
pub type Responder = Arc<dyn Fn(&QueryPlan) -> MondialResult<Vec<Row>> + Send + Sync>;

/// In-memory [`Store`] for tests.
///
/// Rows live in named tables. A query is answered from the first table named
/// in a `FROM <table>` clause of its SQL, keeping the rows whose `name` column
/// equals one of the plan's text binds. Every plan is recorded.
#[derive(Default)]
pub struct MockStore {
    tables: HashMap<String, Vec<Row>>,
    calls: Mutex<Vec<QueryPlan>>,
    failing: AtomicBool,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    responder: Option<Responder>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: impl Into<String>, rows: Vec<Row>) -> Self {
        self.tables.insert(table.into(), rows);
        self
    }

    /// Delay every call, so concurrent calls overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&QueryPlan) -> MondialResult<Vec<Row>> + Send + Sync + 'static,
    {
        self.responder = Some(Arc::new(responder));
        self
    }

    /// Start out failing every call.
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<QueryPlan> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Text binds of the `index`-th recorded call.
    pub fn bound_keys(&self, index: usize) -> Vec<String> {
        self.calls()
            .get(index)
            .map(|plan| text_binds(plan).map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn reset_calls(&self) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.clear();
        }
    }

    /// Highest number of calls observed running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, plan: &QueryPlan) -> MondialResult<()> {
        self.calls
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .push(plan.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(MondialError::fetch_failure("injected store failure"));
        }
        Ok(())
    }

    fn table_for(&self, sql: &str) -> Option<&Vec<Row>> {
        self.tables
            .iter()
            .filter_map(|(name, rows)| {
                sql.find(&format!("FROM {}", name))
                    .map(|position| (position, rows))
            })
            .min_by_key(|(position, _)| *position)
            .map(|(_, rows)| rows)
    }
}

fn text_binds(plan: &QueryPlan) -> impl Iterator<Item = &str> {
    plan.binds().iter().filter_map(|value| match value {
        SqlValue::Text(text) => Some(text.as_str()),
        _ => None,
    })
}

fn name_matches(row: &Row, plan: &QueryPlan) -> bool {
    match row.get("name") {
        Some(SqlValue::Text(name)) => text_binds(plan).any(|bind| bind == name),
        _ => false,
    }
}

#[async_trait]
impl Store for MockStore {
    async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>> {
        self.enter(plan).await?;
        if let Some(responder) = &self.responder {
            return responder(plan);
        }
        Ok(self
            .table_for(plan.sql())
            .map(|rows| {
                rows.iter()
                    .filter(|row| name_matches(row, plan))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn execute(&self, plan: &QueryPlan) -> MondialResult<u64> {
        self.enter(plan).await?;
        let affected = self
            .table_for(&plan.sql().replace("UPDATE ", "FROM "))
            .map(|rows| rows.iter().filter(|row| name_matches(row, plan)).count())
            .unwrap_or(0);
        Ok(affected as u64)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Rows for a few real places, shaped like the batch executors' selects.

    use super::*;

    pub fn city_row(name: &str, population: i64, province: &str) -> Row {
        Row::new()
            .with("name", name)
            .with("population", population)
            .with("latitude", SqlValue::Null)
            .with("longitude", SqlValue::Null)
            .with("elevation", SqlValue::Null)
            .with("province", province)
    }

    pub fn province_row(name: &str, population: i64, capital: &str, area: f64) -> Row {
        Row::new()
            .with("name", name)
            .with("population", population)
            .with("capital", capital)
            .with("area", area)
    }

    pub fn country_row(code: &str, name: &str, population: i64, area: f64, capital: &str) -> Row {
        Row::new()
            .with("code", code)
            .with("name", name)
            .with("population", population)
            .with("area", area)
            .with("capital", capital)
    }

    pub fn paris() -> Row {
        city_row("Paris", 2_249_975, "Ile de France")
            .with("latitude", 48.86)
            .with("longitude", 2.35)
    }

    pub fn madrid() -> Row {
        city_row("Madrid", 3_277_451, "Madrid")
    }

    pub fn bern() -> Row {
        city_row("Bern", 133_115, "Bern")
            .with("latitude", 46.95)
            .with("longitude", 7.45)
            .with("elevation", 540i64)
    }

    pub fn zurich() -> Row {
        city_row("Zurich", 402_762, "Zurich")
    }

    pub fn cities() -> Vec<Row> {
        vec![paris(), madrid(), bern(), zurich()]
    }

    pub fn provinces() -> Vec<Row> {
        vec![
            province_row("Ile de France", 12_005_077, "Paris", 12_011.0),
            province_row("Madrid", 6_661_949, "Madrid", 8_028.0),
            province_row("Bern", 1_039_474, "Bern", 5_959.0),
            province_row("Zurich", 1_520_968, "Zurich", 1_729.0),
        ]
    }

    pub fn countries() -> Vec<Row> {
        vec![
            country_row("F", "France", 64_933_400, 547_030.0, "Paris"),
            country_row("E", "Spain", 46_815_916, 504_750.0, "Madrid"),
            country_row("CH", "Switzerland", 8_236_303, 41_285.0, "Bern"),
        ]
    }

    /// `count` synthetic cities named `City 0`, `City 1`, ...
    pub fn numbered_cities(count: usize) -> Vec<Row> {
        (0..count)
            .map(|i| city_row(&format!("City {}", i), 1_000 + i as i64, "Nowhere"))
            .collect()
    }

    /// A store holding the city, province and country fixtures.
    pub fn mondial_store() -> MockStore {
        MockStore::new()
            .with_table("city", cities())
            .with_table("province", provinces())
            .with_table("country", countries())
    }

    pub fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for loader and compiler inputs.

    use super::*;
    use proptest::prelude::*;

    /// Names known to [`fixtures::mondial_store`](crate::fixtures::mondial_store),
    /// plus two that are not.
    pub const KNOWN_AND_UNKNOWN: [&str; 6] =
        ["Paris", "Madrid", "Bern", "Zurich", "Unknown", "Atlantis"];

    pub fn arb_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{2,10}"
    }

    /// Key batches drawn from a small alphabet, so duplicates are common.
    pub fn arb_key_batch() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(
            prop::sample::select(KNOWN_AND_UNKNOWN.to_vec()).prop_map(str::to_string),
            0..30,
        )
    }

    pub fn arb_continent() -> impl Strategy<Value = Continent> {
        prop::sample::select(Continent::ALL.to_vec())
    }

    /// Ranges with at least one bound set.
    pub fn arb_population_range() -> impl Strategy<Value = PopulationRange> {
        (
            proptest::option::of(0i64..100_000_000),
            proptest::option::of(0i64..100_000_000),
        )
            .prop_filter("at least one bound", |(above, below)| {
                above.is_some() || below.is_some()
            })
            .prop_map(|(above, below)| PopulationRange { above, below })
    }

    /// Filters valid for the countries query.
    pub fn arb_countries_filter() -> impl Strategy<Value = CriteriaFilter> {
        (
            proptest::option::of(arb_continent()),
            proptest::option::of(arb_population_range()),
        )
            .prop_map(|(continent, population_range)| CriteriaFilter {
                continent,
                population_range,
                ..CriteriaFilter::default()
            })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on `MondialResult` error variants.

    use super::*;

    /// Assert that a MondialResult is a store fetch failure.
    #[track_caller]
    pub fn assert_fetch_failure<T: std::fmt::Debug>(result: &MondialResult<T>) {
        match result {
            Err(err) if err.is_fetch_failure() => {}
            other => panic!("Expected FetchFailure, got: {:?}", other),
        }
    }

    /// Assert that a MondialResult is a MissingRequiredFilter for `field`.
    #[track_caller]
    pub fn assert_missing_required_filter<T: std::fmt::Debug>(
        result: &MondialResult<T>,
        field: &str,
    ) {
        match result {
            Err(MondialError::Query(QueryError::MissingRequiredFilter { field: f })) => {
                assert_eq!(f, field, "Wrong field in MissingRequiredFilter");
            }
            other => panic!("Expected MissingRequiredFilter({}), got: {:?}", field, other),
        }
    }

    /// Assert that a MondialResult is an InvalidFilter error.
    #[track_caller]
    pub fn assert_invalid_filter<T: std::fmt::Debug>(result: &MondialResult<T>) {
        match result {
            Err(MondialError::Query(QueryError::InvalidFilter { .. })) => {}
            other => panic!("Expected InvalidFilter, got: {:?}", other),
        }
    }
}
