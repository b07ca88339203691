//! Soil-derived columns.

use super::{is_numeric_column, lookup, min_max};
use polars::prelude::*;

/// Column written by [`soil_health_score`].
pub const SOIL_HEALTH_COLUMN: &str = "soil_health_score";
/// Column written by [`classify_drainage`].
pub const DRAINAGE_CATEGORY_COLUMN: &str = "drainage_category";
/// Share of a field covered by a soil map unit, read by [`area_weighted_average`].
pub const AREA_FRACTION_COLUMN: &str = "area_fraction";

/// Default weights of the soil health score.
pub const SOIL_HEALTH_WEIGHTS: [(&str, f64); 5] = [
    ("om_pct", 0.3),
    ("awc_r", 0.25),
    ("ph_water", 0.2),
    ("drainagecl", 0.15),
    ("claytotal_r", 0.1),
];

/// SSURGO drainage classes and the category each falls in.
pub const DRAINAGE_CATEGORIES: [(&str, &str); 7] = [
    ("Excessively drained", "excessive"),
    ("Somewhat excessively drained", "excessive"),
    ("Well drained", "good"),
    ("Moderately well drained", "good"),
    ("Somewhat poorly drained", "poor"),
    ("Poorly drained", "poor"),
    ("Very poorly drained", "poor"),
];

/// Adds [`SOIL_HEALTH_COLUMN`], a 0..1 composite of the weighted columns.
///
/// Each weighted column is min-max scaled over the table first (0.5 when it is
/// constant). Columns that are missing or not numeric are left out along with
/// their weight; with none left the score is 0.
pub fn soil_health_score(frame: &DataFrame, weights: &[(&str, f64)]) -> PolarsResult<DataFrame> {
    let used: Vec<(&str, f64)> = weights
        .iter()
        .copied()
        .filter(|(c, _)| is_numeric_column(frame, c))
        .collect();
    let total: f64 = used.iter().map(|(_, w)| w).sum();

    let score = used
        .iter()
        .map(|(c, w)| min_max(col(*c)) * lit(*w))
        .reduce(|a, b| a + b)
        .filter(|_| total > 0.0)
        .map_or(lit(0.0), |sum| sum / lit(total));
    frame
        .clone()
        .lazy()
        .with_column(score.alias(SOIL_HEALTH_COLUMN))
        .collect()
}

/// Adds [`DRAINAGE_CATEGORY_COLUMN`] from a drainage class column, null for
/// classes outside [`DRAINAGE_CATEGORIES`].
pub fn classify_drainage(frame: &DataFrame, column: &str) -> PolarsResult<DataFrame> {
    frame.column(column)?;
    let table = DRAINAGE_CATEGORIES
        .into_iter()
        .map(|(class, category)| (lit(class), category));
    let category = lookup(col(column), table, lit(NULL).cast(DataType::String));
    frame
        .clone()
        .lazy()
        .with_column(category.alias(DRAINAGE_CATEGORY_COLUMN))
        .collect()
}

/// One row per `key` with `attribute` averaged over the key's map units.
///
/// With an [`AREA_FRACTION_COLUMN`] each unit counts by its share of the
/// field, as a sum of `attribute * area_fraction`. Without one, units count
/// equally. Null attributes are skipped.
pub fn area_weighted_average(
    frame: &DataFrame,
    key: &str,
    attribute: &str,
) -> PolarsResult<DataFrame> {
    frame.column(attribute)?;
    let value = col(attribute).cast(DataType::Float64);
    let average = if frame.column(AREA_FRACTION_COLUMN).is_ok() {
        (value * col(AREA_FRACTION_COLUMN).cast(DataType::Float64)).sum()
    } else {
        value.mean()
    };
    frame
        .clone()
        .lazy()
        .group_by_stable([col(key)])
        .agg([average.alias(attribute)])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn units() -> DataFrame {
        df!(
            "field_id" => ["F1", "F1", "F2"],
            "om_pct" => [2.0, 4.0, 3.0],
            "ph_water" => [6.0, 6.0, 6.0],
            "drainagecl" => [Some("Well drained"), Some("Very poorly drained"), None],
            "area_fraction" => [0.75, 0.25, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn score_uses_only_numeric_columns() {
        let out = soil_health_score(&units(), &SOIL_HEALTH_WEIGHTS).unwrap();
        let score: Vec<_> = out
            .column(SOIL_HEALTH_COLUMN)
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        // om_pct scales to 0, 1, 0.5; constant ph_water to 0.5.
        let expected = [
            (0.0 * 0.3 + 0.5 * 0.2) / 0.5,
            (1.0 * 0.3 + 0.5 * 0.2) / 0.5,
            (0.5 * 0.3 + 0.5 * 0.2) / 0.5,
        ];
        for (got, want) in score.iter().zip(expected) {
            assert!((got - want).abs() < 1e-12, "{got} vs {want}");
        }
    }

    #[test]
    fn score_without_known_columns_is_zero() {
        let frame = df!("field_id" => ["F1"], "sand" => [40.0]).unwrap();
        let out = soil_health_score(&frame, &SOIL_HEALTH_WEIGHTS).unwrap();
        assert_eq!(out.column(SOIL_HEALTH_COLUMN).unwrap().f64().unwrap().get(0), Some(0.0));
    }

    #[test]
    fn drainage_classes_map_to_categories() {
        let frame = df!(
            "drainagecl" => [Some("Well drained"), Some("Very poorly drained"), Some("Unknown"), None],
        )
        .unwrap();
        let out = classify_drainage(&frame, "drainagecl").unwrap();
        let categories = out.column(DRAINAGE_CATEGORY_COLUMN).unwrap().str().unwrap();
        assert_eq!(categories.get(0), Some("good"));
        assert_eq!(categories.get(1), Some("poor"));
        assert_eq!(categories.get(2), None);
        assert_eq!(categories.get(3), None);
    }

    #[test]
    fn weights_units_by_area_fraction() {
        let out = area_weighted_average(&units(), "field_id", "om_pct").unwrap();
        let om = out.column("om_pct").unwrap().f64().unwrap();
        assert_eq!(om.get(0), Some(2.0 * 0.75 + 4.0 * 0.25));
        assert_eq!(om.get(1), Some(3.0));

        let unweighted = units().drop(AREA_FRACTION_COLUMN).unwrap();
        let out = area_weighted_average(&unweighted, "field_id", "om_pct").unwrap();
        assert_eq!(out.column("om_pct").unwrap().f64().unwrap().get(0), Some(3.0));
    }

    #[test]
    fn missing_attribute_is_an_error() {
        assert!(area_weighted_average(&units(), "field_id", "claytotal_r").is_err());
        assert!(classify_drainage(&units(), "drainage").is_err());
    }
}
