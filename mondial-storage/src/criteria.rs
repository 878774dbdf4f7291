//! Criteria compiler: [`CriteriaFilter`] to parameterized [`QueryPlan`].
//!
//! Compilation is pure. A [`CriteriaTarget`] describes the query being
//! filtered: its base statement, the column each supported constraint applies
//! to, and the constraint it cannot run without. Clauses are appended in a
//! fixed order regardless of how the filter was built:
//!
//! 1. name pattern
//! 2. parent identifier
//! 3. continent
//! 4. population `above`, then `below`

use mondial_core::{
    CriteriaFilter, FilterField, MondialResult, PopulationRange, QueryError, SqlValue,
};

use crate::{PlanBuilder, QueryPlan};

/// Escape character used in `LIKE ... ESCAPE` clauses.
pub const LIKE_ESCAPE: char = '\\';

/// Description of a filterable query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CriteriaTarget {
    pub name: &'static str,
    /// Base statement without a `WHERE` clause.
    pub base_sql: &'static str,
    pub required: Option<FilterField>,
    pub name_column: Option<&'static str>,
    pub parent_column: Option<&'static str>,
    pub continent_column: Option<&'static str>,
    pub population_column: Option<&'static str>,
}

impl CriteriaTarget {
    /// Countries, optionally scoped to a continent.
    pub const COUNTRIES: CriteriaTarget = CriteriaTarget {
        name: "countries",
        base_sql: "SELECT DISTINCT c.code, c.name, c.population, c.area, c.capital \
                   FROM country c INNER JOIN encompasses e ON c.code = e.country",
        required: None,
        name_column: None,
        parent_column: None,
        continent_column: Some("e.continent"),
        population_column: Some("c.population"),
    };

    /// Provinces of one country, identified by the country's name.
    pub const PROVINCES_OF_COUNTRY: CriteriaTarget = CriteriaTarget {
        name: "provinces_of_country",
        base_sql: "SELECT p.name, p.population, p.capital, p.area \
                   FROM country c INNER JOIN province p ON p.country = c.code",
        required: Some(FilterField::ParentIdentifier),
        name_column: None,
        parent_column: Some("c.name"),
        continent_column: None,
        population_column: Some("p.population"),
    };

    /// Cities, provinces and countries by name, tagged with a `type` column.
    pub const PLACES: CriteriaTarget = CriteriaTarget {
        name: "places",
        base_sql: "WITH place AS (\
                   SELECT 'City' AS type, NULL AS code, name, province, elevation, latitude, longitude, \
                   NULL AS area, NULL AS capital, population FROM city \
                   UNION ALL \
                   SELECT 'Province' AS type, NULL AS code, name, NULL AS province, NULL AS elevation, \
                   NULL AS latitude, NULL AS longitude, area, capital, population FROM province \
                   UNION ALL \
                   SELECT 'Country' AS type, code, name, NULL AS province, NULL AS elevation, \
                   NULL AS latitude, NULL AS longitude, area, capital, population FROM country\
                   ) SELECT type, code, name, province, elevation, latitude, longitude, area, capital, population \
                   FROM place",
        required: Some(FilterField::NamePattern),
        name_column: Some("name"),
        parent_column: None,
        continent_column: None,
        population_column: Some("population"),
    };

    pub fn column(&self, field: FilterField) -> Option<&'static str> {
        match field {
            FilterField::NamePattern => self.name_column,
            FilterField::ParentIdentifier => self.parent_column,
            FilterField::Continent => self.continent_column,
            FilterField::PopulationRange => self.population_column,
        }
    }

    pub fn supports(&self, field: FilterField) -> bool {
        self.column(field).is_some()
    }
}

/// Compile `filter` against `target`.
///
/// Fails with `MissingRequiredFilter` when the target's required field is
/// absent, and with `InvalidFilter` for constraints the target does not
/// support or that carry no usable value. Both are detected before any SQL
/// exists.
pub fn compile(filter: &CriteriaFilter, target: &CriteriaTarget) -> MondialResult<QueryPlan> {
    if let Some(required) = target.required {
        if !filter.has(required) {
            return Err(QueryError::MissingRequiredFilter {
                field: required.as_str().to_string(),
            }
            .into());
        }
    }

    for field in filter.present_fields() {
        if !target.supports(field) {
            return Err(invalid(
                field,
                format!("not supported by the {} query", target.name),
            ));
        }
    }

    let mut builder = PlanBuilder::new(target.base_sql);

    if let (Some(pattern), Some(column)) = (&filter.name_pattern, target.name_column) {
        if pattern.is_empty() {
            return Err(invalid(FilterField::NamePattern, "must not be empty"));
        }
        builder.and_where(
            &format!("{} LIKE ? ESCAPE '{}'", column, LIKE_ESCAPE),
            [SqlValue::from(like_pattern(pattern))],
        );
    }

    if let (Some(parent), Some(column)) = (&filter.parent_identifier, target.parent_column) {
        if parent.trim().is_empty() {
            return Err(invalid(FilterField::ParentIdentifier, "must not be empty"));
        }
        builder.and_where(&format!("{} = ?", column), [SqlValue::from(parent.as_str())]);
    }

    if let (Some(continent), Some(column)) = (filter.continent, target.continent_column) {
        builder.and_where(
            &format!("{} = ?", column),
            [SqlValue::from(continent.db_name())],
        );
    }

    if let (Some(range), Some(column)) = (filter.population_range, target.population_column) {
        push_population_range(&mut builder, column, range)?;
    }

    builder.build()
}

fn push_population_range(
    builder: &mut PlanBuilder,
    column: &str,
    range: PopulationRange,
) -> MondialResult<()> {
    if range.is_empty() {
        return Err(invalid(
            FilterField::PopulationRange,
            "needs at least one of above or below",
        ));
    }
    if let Some(above) = range.above {
        builder.and_where(&format!("{} >= ?", column), [SqlValue::from(above)]);
    }
    if let Some(below) = range.below {
        builder.and_where(&format!("{} <= ?", column), [SqlValue::from(below)]);
    }
    Ok(())
}

fn invalid(field: FilterField, reason: impl Into<String>) -> mondial_core::MondialError {
    QueryError::InvalidFilter {
        field: field.as_str().to_string(),
        reason: reason.into(),
    }
    .into()
}

/// Translate a glob-style name pattern into a `LIKE` pattern.
///
/// The escape character, `%` and `_` are escaped first so they match
/// literally; `*` then becomes `%`.
pub fn like_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    for c in pattern.chars() {
        match c {
            LIKE_ESCAPE | '%' | '_' => {
                out.push(LIKE_ESCAPE);
                out.push(c);
            }
            '*' => out.push('%'),
            _ => out.push(c),
        }
    }
    out
}
