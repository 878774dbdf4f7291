//! End-to-end loader behaviour over the mock store.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use mondial_core::{City, Country, LoaderConfig, MondialError, MondialResult, Province, SqlValue};
use mondial_loader::{LoaderPhase, LoaderRegistry, Resolver, CITY, PROVINCE};
use mondial_storage::{BatchFetcher, SqlBatchFetcher};
use mondial_test_utils::assertions::assert_fetch_failure;
use mondial_test_utils::fixtures::{keys, mondial_store, numbered_cities};
use mondial_test_utils::generators::{arb_key_batch, KNOWN_AND_UNKNOWN};
use mondial_test_utils::MockStore;
use proptest::prelude::*;

fn registry(store: &Arc<MockStore>, config: LoaderConfig) -> LoaderRegistry {
    LoaderRegistry::for_request(store.clone(), config)
}

#[tokio::test]
async fn fetch_keeps_key_order_and_absent_slots() {
    let store = mondial_store().into_shared();
    let fetcher = SqlBatchFetcher::cities(store.clone());

    let cities = fetcher
        .fetch(&keys(&["Paris", "Unknown", "Madrid"]))
        .await
        .unwrap();

    assert_eq!(cities.len(), 3);
    assert_eq!(cities[0].as_ref().unwrap().population, Some(2_249_975));
    assert!(cities[1].is_none());
    assert_eq!(cities[2].as_ref().unwrap().population, Some(3_277_451));
    assert_eq!(store.call_count(), 1);
}

#[tokio::test]
async fn empty_key_set_never_reaches_store() {
    let store = mondial_store().into_shared();
    let fetcher = SqlBatchFetcher::cities(store.clone());

    assert!(fetcher.fetch(&[]).await.unwrap().is_empty());
    assert_eq!(store.call_count(), 0);

    let registry = registry(&store, LoaderConfig::default());
    assert!(registry.dispatch_all().await.is_empty());
    assert_eq!(store.call_count(), 0);
}

#[tokio::test]
async fn two_paths_to_bern_make_one_batch() {
    let store = mondial_store().into_shared();
    let registry = Arc::new(registry(&store, LoaderConfig::default()));
    let resolver = Resolver::new(registry.clone(), store.clone());

    // Switzerland's capital and the capital of the canton of Bern.
    let switzerland = Country::new("CH", "Switzerland").with_capital("Bern");
    let canton = Province::new("Bern").with_capital("Bern");

    let via_country = resolver.country_capital(&switzerland);
    let via_province = resolver.province_capital(&canton);
    assert_eq!(registry.cities().unwrap().pending_len(), 1);

    let reports = registry.dispatch_all().await;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].distinct_keys, 1);

    let first = via_country.await.unwrap().unwrap();
    let second = via_province.await.unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.elevation, Some(540));
    assert_eq!(store.call_count(), 1);
    assert_eq!(store.bound_keys(0), keys(&["Bern"]));
}

#[tokio::test]
async fn pending_keys_split_by_max_batch_size() {
    let store = MockStore::new()
        .with_table("city", numbered_cities(25))
        .into_shared();
    let registry = registry(&store, LoaderConfig::default());
    let cities = registry.cities().unwrap();

    let names: Vec<String> = (0..25).map(|i| format!("City {}", i)).collect();
    let pending = cities.load_many(names.clone());
    let report = cities.dispatch().await;

    assert_eq!(report.batches_executed, 3);
    assert_eq!(store.call_count(), 3);
    let mut bound: Vec<usize> = (0..3).map(|i| store.bound_keys(i).len()).collect();
    bound.sort_unstable();
    assert_eq!(bound, vec![5, 10, 10]);

    for (name, city) in names.iter().zip(join_all(pending).await) {
        assert_eq!(&city.unwrap().unwrap().name, name);
    }
    assert_eq!(cities.phase(), LoaderPhase::Fulfilled);
}

#[tokio::test]
async fn failing_store_rejects_every_waiter_alike() {
    let store = mondial_store().failing().into_shared();
    let registry = registry(&store, LoaderConfig::default());
    let cities = registry.cities().unwrap();

    let pending = cities.load_many(["Paris", "Madrid", "Bern"]);
    let report = cities.dispatch().await;
    assert_eq!(report.batches_failed, 1);

    let results: Vec<MondialResult<Option<City>>> = join_all(pending).await;
    for result in &results {
        assert_fetch_failure(result);
    }
    assert_eq!(results[0], results[2]);
}

#[tokio::test]
async fn one_failed_sub_batch_leaves_the_others_intact() {
    let store = MockStore::new()
        .with_responder(|plan| {
            if plan.binds().contains(&SqlValue::from("City 0")) {
                Err(MondialError::fetch_failure("shard down"))
            } else {
                Ok(numbered_cities(4))
            }
        })
        .into_shared();
    let registry = registry(&store, LoaderConfig::default().with_max_batch_size(2));
    let cities = registry.cities().unwrap();

    let pending = cities.load_many(["City 0", "City 1", "City 2", "City 3"]);
    let report = cities.dispatch().await;
    assert_eq!(report.batches_executed, 2);
    assert_eq!(report.batches_failed, 1);

    let results = join_all(pending).await;
    assert!(results[0].is_err());
    assert!(results[1].is_err());
    assert_eq!(results[2].as_ref().unwrap().as_ref().unwrap().name, "City 2");
    assert_eq!(results[3].as_ref().unwrap().as_ref().unwrap().name, "City 3");
}

#[tokio::test]
async fn caching_disabled_still_dedups_sql() {
    let store = mondial_store().into_shared();
    let registry = registry(&store, LoaderConfig::default().with_caching(false));
    let cities = registry.cities().unwrap();

    let first = cities.load("Zurich");
    let second = cities.load("Zurich");
    assert_eq!(cities.pending_len(), 2);

    let report = cities.dispatch().await;
    assert_eq!(report.keys_requested, 2);
    assert_eq!(report.distinct_keys, 1);
    assert_eq!(store.bound_keys(0), keys(&["Zurich"]));
    assert_eq!(first.await.unwrap(), second.await.unwrap());

    // A later load in the same scope goes back to the store.
    let third = cities.load("Zurich");
    cities.dispatch().await;
    assert!(third.await.unwrap().is_some());
    assert_eq!(store.call_count(), 2);
}

#[tokio::test]
async fn cached_key_is_not_fetched_again() {
    let store = mondial_store().into_shared();
    let registry = registry(&store, LoaderConfig::default());
    let cities = registry.cities().unwrap();

    let first = cities.load("Paris");
    registry.dispatch_all().await;
    first.await.unwrap();

    assert_eq!(store.call_count(), 1);
    store.reset_calls();

    let again = cities.load("Paris");
    assert_eq!(cities.pending_len(), 0);
    assert!(again.await.unwrap().is_some());
    assert_eq!(store.call_count(), 0);
    assert_eq!(cities.cache_stats().hits, 1);
}

#[tokio::test(start_paused = true)]
async fn sub_batches_run_within_concurrency_limit() {
    let store = MockStore::new()
        .with_table("city", numbered_cities(40))
        .with_latency(Duration::from_millis(50))
        .into_shared();
    let config = LoaderConfig::default()
        .with_max_batch_size(4)
        .with_max_concurrent_batches(3);
    let registry = registry(&store, config);
    let cities = registry.cities().unwrap();

    let pending = cities.load_many((0..40).map(|i| format!("City {}", i)));
    let report = cities.dispatch().await;

    assert_eq!(report.batches_executed, 10);
    assert_eq!(store.max_in_flight(), 3);
    assert!(join_all(pending).await.iter().all(|r| matches!(r, Ok(Some(_)))));
}

#[tokio::test]
async fn clear_then_reload_retries_after_failure() {
    let store = mondial_store().failing().into_shared();
    let registry = registry(&store, LoaderConfig::default());
    let cities = registry.cities().unwrap();

    let failed = cities.load("Madrid");
    cities.dispatch().await;
    assert!(failed.await.is_err());

    store.set_failing(false);
    cities.clear("Madrid");
    let retried = cities.load("Madrid");
    cities.dispatch().await;
    assert_eq!(retried.await.unwrap().unwrap().population, Some(3_277_451));
}

#[tokio::test]
async fn city_province_chain_across_two_ticks() {
    let store = mondial_store().into_shared();
    let registry = Arc::new(registry(&store, LoaderConfig::default()));
    let resolver = Resolver::new(registry.clone(), store.clone());

    let capitals: Vec<_> = ["Paris", "Madrid"]
        .into_iter()
        .map(|name| registry.load::<City>(CITY, name).unwrap())
        .collect();
    let chain = async {
        let mut provinces = Vec::new();
        for capital in capitals {
            let city = capital.await?.unwrap_or_else(|| City::new("missing"));
            provinces.push(resolver.city_province(&city));
        }
        Ok::<_, MondialError>(provinces)
    };

    let (provinces, reports) = tokio::join!(chain, registry.run_to_completion());
    let provinces: Vec<Option<Province>> = join_all(provinces.unwrap())
        .await
        .into_iter()
        .collect::<MondialResult<_>>()
        .unwrap();

    assert_eq!(provinces[0].as_ref().unwrap().name, "Ile de France");
    assert_eq!(provinces[1].as_ref().unwrap().name, "Madrid");
    assert!(!reports.is_empty());
    assert_eq!(registry.pending_len(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn spawned_city_province_chain_completes() {
    for _ in 0..50 {
        let store = mondial_store().into_shared();
        let registry = Arc::new(registry(&store, LoaderConfig::default()));

        let guard = registry.enter();
        let caller = tokio::spawn({
            let registry = registry.clone();
            async move {
                let _guard = guard;
                let city = registry
                    .load::<City>(CITY, "Paris")?
                    .await?
                    .unwrap_or_else(|| City::new("missing"));
                let province = city.province.clone().unwrap_or_default();
                registry.load::<Province>(PROVINCE, province)?.await
            }
        });

        let reports = tokio::time::timeout(Duration::from_secs(5), registry.run_to_completion())
            .await
            .expect("run_to_completion returned");
        let province = caller.await.unwrap().unwrap().unwrap();

        assert_eq!(province.name, "Ile de France");
        assert_eq!(reports.len(), 2);
        assert_eq!(registry.pending_len(), 0);
        assert_eq!(store.call_count(), 2);
    }
}

#[tokio::test]
async fn known_and_unknown_names_resolve_per_slot() {
    let store = mondial_store().into_shared();
    let registry = registry(&store, LoaderConfig::default());
    let provinces = registry.provinces().unwrap();

    let pending = provinces.load_many(KNOWN_AND_UNKNOWN);
    provinces.dispatch().await;
    let resolved = join_all(pending).await;

    let found: Vec<bool> = resolved
        .iter()
        .map(|r| matches!(r, Ok(Some(_))))
        .collect();
    // Paris is a city, not a province.
    assert_eq!(found, vec![false, true, true, true, false, false]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Any mix of known, unknown and repeated names costs one query and
    /// answers every slot.
    #[test]
    fn key_batches_cost_one_query(names in arb_key_batch()) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        runtime.block_on(async {
            let store = mondial_store().into_shared();
            let registry = registry(&store, LoaderConfig::default());
            let cities = registry.cities().unwrap();

            let pending = cities.load_many(names.clone());
            registry.run_to_completion().await;
            let resolved = join_all(pending).await;

            prop_assert_eq!(store.call_count(), usize::from(!names.is_empty()));
            for (name, city) in names.iter().zip(resolved) {
                let known = ["Paris", "Madrid", "Bern", "Zurich"].contains(&name.as_str());
                match city.unwrap() {
                    Some(city) => {
                        prop_assert_eq!(&city.name, name);
                    }
                    None => {
                        prop_assert!(!known, "{} should resolve", name);
                    }
                }
            }
            Ok(())
        })?;
    }
}
