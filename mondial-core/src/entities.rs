//! Entity types of the Mondial geography model.

use serde::{Deserialize, Serialize};

use crate::Surface;

/// An entity addressable by a natural key.
///
/// The batch executor indexes fetched rows by this key and re-projects them
/// across the requested key order.
pub trait Keyed {
    /// Natural key of this entity (unique per entity type).
    fn natural_key(&self) -> &str;
}

/// A geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCoord {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoCoord {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Present only when both halves are known.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        match (latitude, longitude) {
            (Some(latitude), Some(longitude)) => Some(Self::new(latitude, longitude)),
            _ => None,
        }
    }
}

/// A city row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct City {
    pub name: String,
    pub population: Option<i64>,
    pub geo_location: Option<GeoCoord>,
    pub elevation: Option<i64>,
    /// Owning province, resolved through the "Province" relation.
    pub province: Option<String>,
}

impl City {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            population: None,
            geo_location: None,
            elevation: None,
            province: None,
        }
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_province(mut self, province: impl Into<String>) -> Self {
        self.province = Some(province.into());
        self
    }

    pub fn with_geo_location(mut self, geo: GeoCoord) -> Self {
        self.geo_location = Some(geo);
        self
    }
}

impl Keyed for City {
    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// A province row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Province {
    pub name: String,
    pub population: Option<i64>,
    /// Capital city, resolved through the "City" relation.
    pub capital: Option<String>,
    pub area: Option<f64>,
}

impl Province {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            population: None,
            capital: None,
            area: None,
        }
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_capital(mut self, capital: impl Into<String>) -> Self {
        self.capital = Some(capital.into());
        self
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    /// Area in km².
    pub fn area_surface(&self) -> Option<Surface> {
        self.area.map(Surface::km2)
    }
}

impl Keyed for Province {
    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// A country row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    pub population: Option<i64>,
    pub area: Option<f64>,
    /// Capital city, resolved through the "City" relation.
    pub capital: Option<String>,
}

impl Country {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            population: None,
            area: None,
            capital: None,
        }
    }

    pub fn with_population(mut self, population: i64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_area(mut self, area: f64) -> Self {
        self.area = Some(area);
        self
    }

    pub fn with_capital(mut self, capital: impl Into<String>) -> Self {
        self.capital = Some(capital.into());
        self
    }

    pub fn area_surface(&self) -> Option<Surface> {
        self.area.map(Surface::km2)
    }
}

impl Keyed for Country {
    fn natural_key(&self) -> &str {
        &self.name
    }
}

/// Discriminator values of the polymorphic places query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlaceKind {
    Country,
    Province,
    City,
}

impl PlaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaceKind::Country => "Country",
            PlaceKind::Province => "Province",
            PlaceKind::City => "City",
        }
    }

    /// Exact match on the discriminator column; anything else is unknown.
    pub fn from_discriminator(value: &str) -> Option<Self> {
        match value {
            "Country" => Some(PlaceKind::Country),
            "Province" => Some(PlaceKind::Province),
            "City" => Some(PlaceKind::City),
            _ => None,
        }
    }
}

/// A row of the places query: one of the three entity kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Place {
    Country(Country),
    Province(Province),
    City(City),
}

impl Place {
    pub fn kind(&self) -> PlaceKind {
        match self {
            Place::Country(_) => PlaceKind::Country,
            Place::Province(_) => PlaceKind::Province,
            Place::City(_) => PlaceKind::City,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Place::Country(c) => &c.name,
            Place::Province(p) => &p.name,
            Place::City(c) => &c.name,
        }
    }

    pub fn population(&self) -> Option<i64> {
        match self {
            Place::Country(c) => c.population,
            Place::Province(p) => p.population,
            Place::City(c) => c.population,
        }
    }
}

impl From<Country> for Place {
    fn from(value: Country) -> Self {
        Place::Country(value)
    }
}

impl From<Province> for Place {
    fn from(value: Province) -> Self {
        Place::Province(value)
    }
}

impl From<City> for Place {
    fn from(value: City) -> Self {
        Place::City(value)
    }
}
