//! Filter-driven catalog queries.
//!
//! These run immediately, one statement per call, and are not batched.

use mondial_core::{
    City, Country, CriteriaFilter, MondialResult, Place, PopulationRange, Province, SqlValue,
};
use tracing::debug;

use crate::criteria::{compile, CriteriaTarget};
use crate::mapping::{map_rows, FromRow};
use crate::{QueryPlan, SharedStore};

const COUNTRY_BY_NAME_SQL: &str =
    "SELECT code, name, population, area, capital FROM country WHERE name = ?";

const PROVINCE_BY_CAPITAL_SQL: &str =
    "SELECT name, population, capital, area FROM province WHERE capital = ?";

/// Catalog queries over a store.
#[derive(Clone)]
pub struct Catalog {
    store: SharedStore,
}

impl Catalog {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    async fn run<T: FromRow>(&self, query: &str, plan: QueryPlan) -> MondialResult<Vec<T>> {
        debug!(query, sql = %plan.sql(), binds = plan.binds().len(), "catalog query");
        let rows = self.store.query(&plan).await?;
        map_rows(&rows)
    }

    /// Countries matching an optional continent and population range.
    pub async fn countries(&self, filter: &CriteriaFilter) -> MondialResult<Vec<Country>> {
        let plan = compile(filter, &CriteriaTarget::COUNTRIES)?;
        self.run("countries", plan).await
    }

    /// Provinces of the country named by `parent_identifier`.
    pub async fn provinces(&self, filter: &CriteriaFilter) -> MondialResult<Vec<Province>> {
        let plan = compile(filter, &CriteriaTarget::PROVINCES_OF_COUNTRY)?;
        self.run("provinces", plan).await
    }

    /// Provinces of `country`, optionally bounded by population.
    ///
    /// The parent is always taken from `country` itself.
    pub async fn provinces_of(
        &self,
        country: &Country,
        population_range: Option<PopulationRange>,
    ) -> MondialResult<Vec<Province>> {
        let mut filter = CriteriaFilter::new().with_parent_identifier(country.name.as_str());
        filter.population_range = population_range;
        self.provinces(&filter).await
    }

    /// Cities, provinces and countries whose name matches a glob pattern.
    pub async fn places(&self, filter: &CriteriaFilter) -> MondialResult<Vec<Place>> {
        let plan = compile(filter, &CriteriaTarget::PLACES)?;
        self.run("places", plan).await
    }

    pub async fn country_by_name(&self, name: &str) -> MondialResult<Option<Country>> {
        let plan = QueryPlan::new(COUNTRY_BY_NAME_SQL, vec![SqlValue::from(name)])?;
        Ok(self.run("country_by_name", plan).await?.into_iter().next())
    }

    /// The province whose capital is `city`.
    pub async fn province_by_capital(&self, city: &City) -> MondialResult<Option<Province>> {
        let plan = QueryPlan::new(PROVINCE_BY_CAPITAL_SQL, vec![SqlValue::from(city.name.as_str())])?;
        Ok(self.run("province_by_capital", plan).await?.into_iter().next())
    }
}
