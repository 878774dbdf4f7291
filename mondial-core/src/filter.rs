//! Structured query criteria.
//!
//! A [`CriteriaFilter`] is a set of optional constraints. Which of them a
//! query supports, and which one it requires, is decided by the query target
//! the filter is compiled against, not by the filter itself.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Continent, MondialResult, QueryError};

/// Inclusive population bounds. At least one side must be set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PopulationRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub above: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below: Option<i64>,
}

impl PopulationRange {
    pub fn above(min: i64) -> Self {
        Self {
            above: Some(min),
            below: None,
        }
    }

    pub fn below(max: i64) -> Self {
        Self {
            above: None,
            below: Some(max),
        }
    }

    pub fn between(min: i64, max: i64) -> Self {
        Self {
            above: Some(min),
            below: Some(max),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.above.is_none() && self.below.is_none()
    }
}

/// The individual constraints a filter can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    NamePattern,
    ParentIdentifier,
    Continent,
    PopulationRange,
}

impl FilterField {
    /// Field name as it appears in JSON input and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterField::NamePattern => "namePattern",
            FilterField::ParentIdentifier => "parentIdentifier",
            FilterField::Continent => "continent",
            FilterField::PopulationRange => "populationRange",
        }
    }
}

impl fmt::Display for FilterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional query constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CriteriaFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continent: Option<Continent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population_range: Option<PopulationRange>,
    /// Glob-style pattern; `*` matches any run of characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_pattern: Option<String>,
    /// Name of the parent entity a nested collection is scoped to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_identifier: Option<String>,
}

impl CriteriaFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a filter from JSON. Unknown fields are rejected.
    pub fn from_json(json: &str) -> MondialResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            QueryError::InvalidFilter {
                field: "criteria".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn with_continent(mut self, continent: Continent) -> Self {
        self.continent = Some(continent);
        self
    }

    pub fn with_population_range(mut self, range: PopulationRange) -> Self {
        self.population_range = Some(range);
        self
    }

    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    pub fn with_parent_identifier(mut self, parent: impl Into<String>) -> Self {
        self.parent_identifier = Some(parent.into());
        self
    }

    pub fn has(&self, field: FilterField) -> bool {
        match field {
            FilterField::NamePattern => self.name_pattern.is_some(),
            FilterField::ParentIdentifier => self.parent_identifier.is_some(),
            FilterField::Continent => self.continent.is_some(),
            FilterField::PopulationRange => self.population_range.is_some(),
        }
    }

    /// Fields that carry a value.
    pub fn present_fields(&self) -> Vec<FilterField> {
        [
            FilterField::NamePattern,
            FilterField::ParentIdentifier,
            FilterField::Continent,
            FilterField::PopulationRange,
        ]
        .into_iter()
        .filter(|field| self.has(*field))
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.present_fields().is_empty()
    }
}

/// Input of the province mutation. Unset fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvinceUpdate {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
}

impl ProvinceUpdate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            population: None,
            area: None,
        }
    }

    pub fn from_json(json: &str) -> MondialResult<Self> {
        serde_json::from_str(json).map_err(|e| {
            QueryError::InvalidFilter {
                field: "input".to_string(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }
}
