//! Province reads and the province mutation.

use mondial_core::{
    MondialResult, Province, ProvinceUpdate, QueryError, SqlValue, StorageError,
};
use tracing::{error, info};

use crate::mapping::map_rows;
use crate::{QueryPlan, SharedStore};

const FIND_BY_NAME_SQL: &str =
    "SELECT name, population, capital, area FROM province WHERE name = ?";

const UPDATE_SQL: &str =
    "UPDATE province SET population = ?, capital = ?, area = ? WHERE name = ?";

/// Data access for the `province` table.
#[derive(Clone)]
pub struct ProvinceDao {
    store: SharedStore,
}

impl ProvinceDao {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    pub async fn find_by_name(&self, name: &str) -> MondialResult<Option<Province>> {
        let plan = QueryPlan::new(FIND_BY_NAME_SQL, vec![SqlValue::from(name)])?;
        let rows = self.store.query(&plan).await?;
        Ok(map_rows::<Province>(&rows)?.into_iter().next())
    }

    /// Overwrite population, capital and area of the named province.
    pub async fn update(&self, province: &Province) -> MondialResult<()> {
        let plan = QueryPlan::new(
            UPDATE_SQL,
            vec![
                SqlValue::from(province.population),
                SqlValue::from(province.capital.clone()),
                SqlValue::from(province.area),
                SqlValue::from(province.name.as_str()),
            ],
        )?;

        let affected = self.store.execute(&plan).await?;
        if affected == 0 {
            error!(province = %province.name, "no province updated, name not found");
            return Err(StorageError::NotFound {
                entity: "Province".to_string(),
                name: province.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Merge `input` into the stored province and persist it.
    ///
    /// Fields left unset in `input` keep their stored values. Returns the
    /// province as written.
    pub async fn apply_update(&self, input: &ProvinceUpdate) -> MondialResult<Province> {
        if input.name.trim().is_empty() {
            error!("province update without a name");
            return Err(QueryError::MissingRequiredFilter {
                field: "name".to_string(),
            }
            .into());
        }

        let existing = self.find_by_name(&input.name).await?.ok_or_else(|| {
            StorageError::NotFound {
                entity: "Province".to_string(),
                name: input.name.clone(),
            }
        })?;
        info!(province = %existing.name, "province found");

        let updated = Province {
            population: input.population.or(existing.population),
            area: input.area.or(existing.area),
            ..existing
        };

        self.update(&updated).await?;
        info!(province = %updated.name, population = ?updated.population, area = ?updated.area, "province updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use async_trait::async_trait;
    use mondial_core::{MondialError, Row};
    use std::sync::{Arc, Mutex};

    /// One-table province store that applies updates in memory.
    struct ProvinceTable {
        rows: Mutex<Vec<Row>>,
        statements: Mutex<Vec<QueryPlan>>,
    }

    impl ProvinceTable {
        fn with(rows: Vec<Row>) -> Arc<Self> {
            Arc::new(Self {
                rows: Mutex::new(rows),
                statements: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Store for ProvinceTable {
        async fn query(&self, plan: &QueryPlan) -> MondialResult<Vec<Row>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|row| row.get("name") == plan.binds().first())
                .cloned()
                .collect())
        }

        async fn execute(&self, plan: &QueryPlan) -> MondialResult<u64> {
            self.statements.lock().unwrap().push(plan.clone());
            let binds = plan.binds();
            let mut rows = self.rows.lock().unwrap();
            let mut affected = 0;
            for row in rows.iter_mut().filter(|row| row.get("name") == binds.get(3)) {
                row.push("population", binds[0].clone());
                row.push("capital", binds[1].clone());
                row.push("area", binds[2].clone());
                affected += 1;
            }
            Ok(affected)
        }
    }

    fn bern() -> Row {
        Row::new()
            .with("name", "Bern")
            .with("population", 1_039_474i64)
            .with("capital", "Bern")
            .with("area", 5959.0)
    }

    #[tokio::test]
    async fn test_find_by_name() {
        let dao = ProvinceDao::new(ProvinceTable::with(vec![bern()]));
        let found = dao.find_by_name("Bern").await.unwrap().unwrap();
        assert_eq!(found.population, Some(1_039_474));
        assert!(dao.find_by_name("Zug").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_binds_nullable_values() {
        let table = ProvinceTable::with(vec![bern()]);
        let dao = ProvinceDao::new(table.clone());

        dao.update(&Province::new("Bern")).await.unwrap();

        let statements = table.statements.lock().unwrap().clone();
        assert_eq!(
            statements[0].binds(),
            &[
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::Null,
                SqlValue::from("Bern")
            ]
        );
    }

    #[tokio::test]
    async fn test_update_unknown_is_not_found() {
        let dao = ProvinceDao::new(ProvinceTable::with(vec![]));
        let err = dao.update(&Province::new("Atlantis")).await.unwrap_err();
        assert!(matches!(
            err,
            MondialError::Storage(StorageError::NotFound { ref name, .. }) if name == "Atlantis"
        ));
    }

    #[tokio::test]
    async fn test_apply_update_merges_unset_fields() {
        let dao = ProvinceDao::new(ProvinceTable::with(vec![bern()]));

        let updated = dao
            .apply_update(&ProvinceUpdate::new("Bern").with_population(1_043_132))
            .await
            .unwrap();

        assert_eq!(updated.population, Some(1_043_132));
        assert_eq!(updated.area, Some(5959.0));
        assert_eq!(updated.capital.as_deref(), Some("Bern"));

        let stored = dao.find_by_name("Bern").await.unwrap().unwrap();
        assert_eq!(stored, updated);
    }

    #[tokio::test]
    async fn test_apply_update_requires_name() {
        let dao = ProvinceDao::new(ProvinceTable::with(vec![bern()]));
        let err = dao.apply_update(&ProvinceUpdate::default()).await.unwrap_err();
        assert!(matches!(
            err,
            MondialError::Query(QueryError::MissingRequiredFilter { .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_update_unknown_province() {
        let dao = ProvinceDao::new(ProvinceTable::with(vec![bern()]));
        let err = dao
            .apply_update(&ProvinceUpdate::new("Zug").with_area(239.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MondialError::Storage(StorageError::NotFound { .. })
        ));
    }
}
