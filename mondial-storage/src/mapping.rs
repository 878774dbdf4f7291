//! Row to entity mapping.

use mondial_core::{
    City, Country, GeoCoord, MappingError, MondialResult, Place, PlaceKind, Province, Row,
};

/// Entities that can be read from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> MondialResult<Self>;
}

impl FromRow for City {
    fn from_row(row: &Row) -> MondialResult<Self> {
        Ok(City {
            name: row.text("name")?,
            population: row.opt_int("population")?,
            geo_location: GeoCoord::from_parts(
                row.opt_float("latitude")?,
                row.opt_float("longitude")?,
            ),
            elevation: row.opt_int("elevation")?,
            province: row.opt_text("province")?,
        })
    }
}

impl FromRow for Province {
    fn from_row(row: &Row) -> MondialResult<Self> {
        Ok(Province {
            name: row.text("name")?,
            population: row.opt_int("population")?,
            capital: row.opt_text("capital")?,
            area: row.opt_float("area")?,
        })
    }
}

impl FromRow for Country {
    fn from_row(row: &Row) -> MondialResult<Self> {
        Ok(Country {
            code: row.text("code")?,
            name: row.text("name")?,
            population: row.opt_int("population")?,
            area: row.opt_float("area")?,
            capital: row.opt_text("capital")?,
        })
    }
}

/// Polymorphic rows carry their variant in the `type` column.
impl FromRow for Place {
    fn from_row(row: &Row) -> MondialResult<Self> {
        let discriminator = row.text("type")?;
        let kind = PlaceKind::from_discriminator(&discriminator)
            .ok_or(MappingError::UnknownVariant { discriminator })?;

        Ok(match kind {
            PlaceKind::Country => Place::Country(Country::from_row(row)?),
            PlaceKind::Province => Place::Province(Province::from_row(row)?),
            PlaceKind::City => Place::City(City::from_row(row)?),
        })
    }
}

/// Map every row, failing on the first bad one.
pub fn map_rows<T: FromRow>(rows: &[Row]) -> MondialResult<Vec<T>> {
    rows.iter().map(T::from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mondial_core::{MondialError, SqlValue};

    fn city_row() -> Row {
        Row::new()
            .with("name", "Bern")
            .with("population", 133_115i64)
            .with("latitude", 46.95)
            .with("longitude", 7.45)
            .with("elevation", 540i64)
            .with("province", "Bern")
    }

    #[test]
    fn test_city_from_row() {
        let city = City::from_row(&city_row()).unwrap();
        assert_eq!(city.name, "Bern");
        assert_eq!(city.population, Some(133_115));
        assert_eq!(city.geo_location, Some(GeoCoord::new(46.95, 7.45)));
        assert_eq!(city.elevation, Some(540));
        assert_eq!(city.province.as_deref(), Some("Bern"));
    }

    #[test]
    fn test_city_without_longitude_has_no_location() {
        let mut row = city_row();
        row.push("longitude", SqlValue::Null);
        assert_eq!(City::from_row(&row).unwrap().geo_location, None);
    }

    #[test]
    fn test_numeric_cells_are_accepted() {
        // NUMERIC columns arrive as floats.
        let row = Row::new()
            .with("name", "Bern")
            .with("population", 1_039_474.0)
            .with("capital", "Bern")
            .with("area", 5959.0);
        let province = Province::from_row(&row).unwrap();
        assert_eq!(province.population, Some(1_039_474));
        assert_eq!(province.area, Some(5959.0));
    }

    #[test]
    fn test_missing_column_fails() {
        let row = Row::new().with("name", "France");
        let err = Country::from_row(&row).unwrap_err();
        assert!(matches!(
            err,
            MondialError::Mapping(MappingError::MissingColumn { .. })
        ));
    }

    fn place_row(kind: &str) -> Row {
        Row::new()
            .with("type", kind)
            .with("code", SqlValue::Null)
            .with("name", "Bern")
            .with("province", "Bern")
            .with("elevation", SqlValue::Null)
            .with("latitude", SqlValue::Null)
            .with("longitude", SqlValue::Null)
            .with("area", SqlValue::Null)
            .with("capital", "Bern")
            .with("population", 133_115i64)
    }

    #[test]
    fn test_place_dispatches_on_type() {
        assert!(matches!(
            Place::from_row(&place_row("City")).unwrap(),
            Place::City(_)
        ));
        assert!(matches!(
            Place::from_row(&place_row("Province")).unwrap(),
            Place::Province(_)
        ));
    }

    #[test]
    fn test_place_unknown_variant() {
        let err = Place::from_row(&place_row("Island")).unwrap_err();
        assert_eq!(
            err,
            MondialError::Mapping(MappingError::UnknownVariant {
                discriminator: "Island".to_string()
            })
        );
    }

    #[test]
    fn test_map_rows_stops_on_error() {
        let rows = vec![place_row("City"), place_row("Lake")];
        assert!(map_rows::<Place>(&rows).is_err());
    }
}
