//! Mondial Capitals Entry Point
//!
//! Lists countries (optionally of one continent) with their area, capital city
//! and that capital's province. Capitals and provinces are each fetched with one
//! batched pass, however many countries match.
//!
//! Usage: `mondial-capitals [continent]`

use std::sync::Arc;

use futures_util::future::{self, join_all, FutureExt};
use mondial_core::{Continent, CriteriaFilter, LoaderConfig, MondialResult};
use mondial_loader::{init_tracing, LoaderRegistry, Resolver, TelemetryConfig};
use mondial_storage::{DbConfig, PgStore, SharedStore};

#[tokio::main]
async fn main() -> MondialResult<()> {
    let telemetry_config = TelemetryConfig::from_env()?;
    init_tracing(&telemetry_config)?;

    let mut filter = CriteriaFilter::new();
    if let Some(arg) = std::env::args().nth(1) {
        filter = filter.with_continent(arg.parse::<Continent>()?);
    }

    let db_config = DbConfig::from_env()?;
    let store: SharedStore = Arc::new(PgStore::from_config(&db_config)?);
    let loader_config = LoaderConfig::from_env()?;

    let registry = Arc::new(LoaderRegistry::for_request(store.clone(), loader_config));
    let resolver = Resolver::new(registry.clone(), store);

    let countries = resolver.catalog().countries(&filter).await?;
    tracing::info!(countries = countries.len(), "countries loaded");

    let pending: Vec<_> = countries
        .iter()
        .map(|country| resolver.country_capital(country))
        .collect();
    registry.dispatch_all().await;
    let capitals = join_all(pending)
        .await
        .into_iter()
        .collect::<MondialResult<Vec<_>>>()?;

    let pending: Vec<_> = capitals
        .iter()
        .map(|capital| match capital {
            Some(city) => resolver.city_province(city),
            None => future::ready(Ok(None)).boxed(),
        })
        .collect();
    registry.dispatch_all().await;
    let provinces = join_all(pending)
        .await
        .into_iter()
        .collect::<MondialResult<Vec<_>>>()?;

    for ((country, capital), province) in countries.iter().zip(&capitals).zip(&provinces) {
        let capital_name = capital.as_ref().map_or("-", |city| city.name.as_str());
        let population = capital
            .as_ref()
            .and_then(|city| city.population)
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        let province_name = province.as_ref().map_or("-", |p| p.name.as_str());
        let area = country
            .area_surface()
            .map_or_else(|| "-".to_string(), |surface| surface.to_string());
        println!(
            "{}\t{}\t{}\t{}\t{}",
            country.name, area, capital_name, population, province_name
        );
    }

    Ok(())
}
