//! Continent enumeration and its database spelling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// Continents as exposed by the query surface.
///
/// The database stores a few of them under a different spelling, see
/// [`Continent::db_name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Continent {
    Europe,
    Asia,
    Africa,
    SouthAmerica,
    NorthAmerica,
    Oceania,
}

impl Continent {
    pub const ALL: [Continent; 6] = [
        Continent::Europe,
        Continent::Asia,
        Continent::Africa,
        Continent::SouthAmerica,
        Continent::NorthAmerica,
        Continent::Oceania,
    ];

    /// Name as stored in the `encompasses.continent` column.
    pub fn db_name(&self) -> &'static str {
        match self {
            Continent::Europe => "Europe",
            Continent::Asia => "Asia",
            Continent::Africa => "Africa",
            Continent::SouthAmerica => "South America",
            Continent::NorthAmerica => "North America",
            Continent::Oceania => "Australia/Oceania",
        }
    }

    /// Name as exposed by the query surface.
    pub fn as_str(&self) -> &'static str {
        match self {
            Continent::Europe => "Europe",
            Continent::Asia => "Asia",
            Continent::Africa => "Africa",
            Continent::SouthAmerica => "SouthAmerica",
            Continent::NorthAmerica => "NorthAmerica",
            Continent::Oceania => "Oceania",
        }
    }
}

impl fmt::Display for Continent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Continent {
    type Err = ValidationError;

    /// Accepts either the surface name or the database spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Continent::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s) || c.db_name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ValidationError::InvalidContinent {
                input: s.to_string(),
            })
    }
}
