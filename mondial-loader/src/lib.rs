//! Mondial Loader - Request-Scoped Batch Loading
//!
//! Collects the keys a resolution pass asks for, answers them with one batch
//! query per relation and sub-batch, and hands every caller the same future for
//! the same key within a request.
//!
//! ```text
//! load("Paris") ─┐                      ┌─> Paris
//! load("Bern")  ─┼─> dispatch_all() ──> │   SELECT ... WHERE name IN (?, ?)
//! load("Paris") ─┘                      └─> Bern
//! ```

pub mod cache;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod telemetry;

pub use cache::{CacheStats, LoadFuture, LoadResult, RequestCache};
pub use registry::{CallerGuard, LoaderRegistry, CITY, PROVINCE};
pub use resolver::{
    FetchMode, ProvincesOf, Relation, Resolver, CITY_PROVINCE, COUNTRY_CAPITAL, PROVINCE_CAPITAL,
};
pub use scheduler::{BatchLoader, Dispatch, DispatchReport, LoaderPhase};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
