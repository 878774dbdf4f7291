//! Resolver-boundary adapter.
//!
//! Connects a parent entity's field to a keyed relation. In batched mode the
//! key goes through the request's [`LoaderRegistry`]; in direct mode one query
//! runs per call and neither the scheduler nor the cache is involved.

use std::marker::PhantomData;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture, FutureExt};
use mondial_core::{City, Country, MondialResult, PopulationRange, Province};
use mondial_storage::{Catalog, SharedStore};
use tracing::debug;

use crate::cache::LoadResult;
use crate::registry::{LoaderRegistry, CITY, PROVINCE};

/// How relation fields are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    #[default]
    Batched,
    Direct,
}

/// A parent-to-child link: the child relation name and how to read the
/// child's key off the parent.
pub struct Relation<P, V> {
    pub relation: &'static str,
    key_of: fn(&P) -> Option<&str>,
    _types: PhantomData<fn(&P) -> V>,
}

impl<P, V> Relation<P, V> {
    pub const fn new(relation: &'static str, key_of: fn(&P) -> Option<&str>) -> Self {
        Self {
            relation,
            key_of,
            _types: PhantomData,
        }
    }

    /// The child key, or `None` when the parent has no link.
    pub fn key(&self, parent: &P) -> Option<String> {
        (self.key_of)(parent)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

fn country_capital(country: &Country) -> Option<&str> {
    country.capital.as_deref()
}

fn province_capital(province: &Province) -> Option<&str> {
    province.capital.as_deref()
}

fn city_province(city: &City) -> Option<&str> {
    city.province.as_deref()
}

pub const COUNTRY_CAPITAL: Relation<Country, City> = Relation::new(CITY, country_capital);
pub const PROVINCE_CAPITAL: Relation<Province, City> = Relation::new(CITY, province_capital);
pub const CITY_PROVINCE: Relation<City, Province> = Relation::new(PROVINCE, city_province);

/// Input for `Country.provinces`. The parent identifier always comes from
/// `country`.
#[derive(Debug, Clone)]
pub struct ProvincesOf {
    pub country: Country,
    pub population_range: Option<PopulationRange>,
}

impl ProvincesOf {
    pub fn new(country: Country) -> Self {
        Self {
            country,
            population_range: None,
        }
    }

    pub fn with_population_range(mut self, range: PopulationRange) -> Self {
        self.population_range = Some(range);
        self
    }
}

/// Field resolution for one request scope.
#[derive(Clone)]
pub struct Resolver {
    registry: Arc<LoaderRegistry>,
    catalog: Catalog,
    mode: FetchMode,
}

impl Resolver {
    pub fn new(registry: Arc<LoaderRegistry>, store: SharedStore) -> Self {
        Self {
            registry,
            catalog: Catalog::new(store),
            mode: FetchMode::Batched,
        }
    }

    pub fn with_mode(mut self, mode: FetchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn registry(&self) -> &Arc<LoaderRegistry> {
        &self.registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Resolve `relation` for `parent`.
    ///
    /// A parent without a key resolves at once to `None`. Lookup errors
    /// (unregistered relation, wrong value type) come back as a ready error.
    pub fn resolve<P, V>(
        &self,
        relation: &Relation<P, V>,
        parent: &P,
    ) -> BoxFuture<'static, LoadResult<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let Some(key) = relation.key(parent) else {
            return future::ready(Ok(None)).boxed();
        };

        let loader = match self.registry.loader::<V>(relation.relation) {
            Ok(loader) => loader,
            Err(err) => return future::ready(Err(err)).boxed(),
        };

        match self.mode {
            FetchMode::Batched => loader.load(key).boxed(),
            FetchMode::Direct => {
                debug!(relation = relation.relation, key = %key, "direct fetch");
                let fetcher = loader.fetcher();
                async move { fetcher.fetch_one(&key).await }.boxed()
            }
        }
    }

    pub fn country_capital(&self, country: &Country) -> BoxFuture<'static, LoadResult<City>> {
        self.resolve(&COUNTRY_CAPITAL, country)
    }

    pub fn province_capital(&self, province: &Province) -> BoxFuture<'static, LoadResult<City>> {
        self.resolve(&PROVINCE_CAPITAL, province)
    }

    pub fn city_province(&self, city: &City) -> BoxFuture<'static, LoadResult<Province>> {
        self.resolve(&CITY_PROVINCE, city)
    }

    /// `Country.provinces`: one immediate catalog query, not batched.
    pub async fn provinces_of(&self, input: &ProvincesOf) -> MondialResult<Vec<Province>> {
        self.catalog
            .provinces_of(&input.country, input.population_range)
            .await
    }
}
