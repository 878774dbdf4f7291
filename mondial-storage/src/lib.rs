//! Mondial Storage - Store Boundary, Criteria Compiler and Batch Executors
//!
//! Everything that turns a request for entities into SQL and rows back into
//! entities. The loader crate schedules calls into this one; nothing here
//! keeps state between calls.

pub mod batch;
pub mod catalog;
pub mod criteria;
pub mod mapping;
pub mod plan;
pub mod postgres;
pub mod province_dao;
pub mod store;

pub use batch::{dedup_keys, BatchFetcher, CityFetcher, ProvinceFetcher, SqlBatchFetcher};
pub use catalog::Catalog;
pub use criteria::{compile, like_pattern, CriteriaTarget, LIKE_ESCAPE};
pub use mapping::{map_rows, FromRow};
pub use plan::{count_placeholders, PlanBuilder, QueryPlan};
pub use postgres::{DbConfig, PgStore};
pub use province_dao::ProvinceDao;
pub use store::{SharedStore, Store};
