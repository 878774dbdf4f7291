//! Surface value type: an amount plus a unit (km² or m²).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::ValidationError;

/// `<amount> <unit>` with an optional sign and decimal part.
static SURFACE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<amount>-?[0-9]*(?:\.[0-9]+)?)\s*(?P<unit>km2|km²|m2|m²)\s*$")
        .expect("surface pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SurfaceUnit {
    #[serde(rename = "km²")]
    SquareKilometre,
    #[serde(rename = "m²")]
    SquareMetre,
}

impl SurfaceUnit {
    pub fn symbol(&self) -> &'static str {
        match self {
            SurfaceUnit::SquareKilometre => "km²",
            SurfaceUnit::SquareMetre => "m²",
        }
    }

    /// Lenient unit lookup: anything that is not square metres is km².
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol.to_lowercase().as_str() {
            "m2" | "m²" => SurfaceUnit::SquareMetre,
            _ => SurfaceUnit::SquareKilometre,
        }
    }
}

/// An area such as `12345.123 km²`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    pub amount: f64,
    pub unit: SurfaceUnit,
}

impl Surface {
    pub fn new(amount: f64, unit: SurfaceUnit) -> Self {
        Self { amount, unit }
    }

    pub fn km2(amount: f64) -> Self {
        Self::new(amount, SurfaceUnit::SquareKilometre)
    }

    pub fn m2(amount: f64) -> Self {
        Self::new(amount, SurfaceUnit::SquareMetre)
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.symbol())
    }
}

impl From<f64> for Surface {
    fn from(amount: f64) -> Self {
        Surface::km2(amount)
    }
}

impl From<i64> for Surface {
    fn from(amount: i64) -> Self {
        Surface::km2(amount as f64)
    }
}

impl FromStr for Surface {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidSurface {
            input: s.to_string(),
        };

        // A bare number is an amount in km².
        if let Ok(amount) = s.trim().parse::<f64>() {
            return Ok(Surface::km2(amount));
        }

        let captures = SURFACE_PATTERN.captures(s).ok_or_else(invalid)?;
        let amount = captures
            .name("amount")
            .map(|m| m.as_str())
            .filter(|m| !m.is_empty() && *m != "-")
            .ok_or_else(invalid)?
            .parse::<f64>()
            .map_err(|_| invalid())?;
        let unit = captures
            .name("unit")
            .map(|m| SurfaceUnit::from_symbol(m.as_str()))
            .ok_or_else(invalid)?;

        Ok(Surface::new(amount, unit))
    }
}
