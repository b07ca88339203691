//! Caller-side reshaping of attribute tables before they are joined, and
//! derived columns computed from them.
//!
//! The join keeps the first record per field for sources without a time
//! column. When a source yields several records per field that should be
//! combined instead, reduce them here first with [`pre_aggregate`] or
//! [`pivot_by_period`].

mod crops;
mod soil;
mod weather;

pub use crops::{
    analyze_rotation, classify_crop_type, dominant_crops, CROP_CATEGORIES, CROP_CATEGORY_COLUMN,
};
pub use soil::{
    area_weighted_average, classify_drainage, soil_health_score, AREA_FRACTION_COLUMN,
    DRAINAGE_CATEGORIES, DRAINAGE_CATEGORY_COLUMN, SOIL_HEALTH_COLUMN, SOIL_HEALTH_WEIGHTS,
};
pub use weather::{growing_degree_days, seasonal_summary, Season, GDD_BASE_C, GDD_CAP_C};

use polars::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    First,
    Last,
    Mean,
    Sum,
    Min,
    Max,
    /// Non-null values.
    Count,
}

impl Aggregation {
    fn apply(self, expr: Expr) -> Expr {
        match self {
            Aggregation::First => expr.first(),
            Aggregation::Last => expr.last(),
            Aggregation::Mean => expr.mean(),
            Aggregation::Sum => expr.sum(),
            Aggregation::Min => expr.min(),
            Aggregation::Max => expr.max(),
            Aggregation::Count => expr.count(),
        }
    }
}

/// Reduces `frame` to one row per `key`, in order of first appearance.
///
/// When `order_by` is given, values are sorted by it within each key first, so
/// that `First` and `Last` are meaningful.
pub fn pre_aggregate(
    frame: &DataFrame,
    key: &str,
    columns: &[&str],
    how: Aggregation,
    order_by: Option<&str>,
) -> PolarsResult<DataFrame> {
    let aggs: Vec<Expr> = columns
        .iter()
        .map(|c| {
            let values = match order_by {
                Some(order) => col(*c).sort_by(
                    [col(order)],
                    SortMultipleOptions::default()
                        .with_maintain_order(true)
                        .with_nulls_last(true),
                ),
                None => col(*c),
            };
            how.apply(values)
        })
        .collect();
    frame
        .clone()
        .lazy()
        .group_by_stable([col(key)])
        .agg(aggs)
        .collect()
}

/// Spreads one value per period into its own column, e.g. the crop of each
/// year into `crop_2021`, `crop_2022`.
///
/// Columns are named `<prefix>_<period>` and ordered by period. A key without
/// a record for a period gets null there; for repeated records the first wins.
pub fn pivot_by_period(
    frame: &DataFrame,
    key: &str,
    period: &str,
    value: &str,
    prefix: &str,
) -> PolarsResult<DataFrame> {
    let periods = frame
        .column(period)?
        .as_materialized_series()
        .unique()?
        .sort(SortOptions::default())?
        .cast(&DataType::String)?;
    let aggs: Vec<Expr> = periods
        .str()?
        .into_iter()
        .flatten()
        .map(|p| {
            col(value)
                .filter(col(period).cast(DataType::String).eq(lit(p.to_string())))
                .first()
                .alias(format!("{prefix}_{p}"))
        })
        .collect();
    if aggs.is_empty() {
        return frame
            .clone()
            .lazy()
            .select([col(key)])
            .unique_stable(None, UniqueKeepStrategy::First)
            .collect();
    }
    frame
        .clone()
        .lazy()
        .group_by_stable([col(key)])
        .agg(aggs)
        .collect()
}

/// Adds `<column>_sum_<window>` holding the sum of each row and the
/// `window - 1` rows before it of the same key.
///
/// Rows are sorted by key then `order_by`; with one row per day this is a
/// trailing `window`-day total. Partial windows at the start of a key are
/// summed as they are.
pub fn rolling_sum(
    frame: &DataFrame,
    key: &str,
    order_by: &str,
    column: &str,
    window: usize,
) -> PolarsResult<DataFrame> {
    let options = RollingOptionsFixedWindow {
        window_size: window.max(1),
        min_periods: 1,
        ..Default::default()
    };
    frame
        .clone()
        .lazy()
        .sort([key, order_by], SortMultipleOptions::default().with_maintain_order(true))
        .with_column(
            col(column)
                .cast(DataType::Float64)
                .rolling_sum(options)
                .over([col(key)])
                .alias(format!("{column}_sum_{window}")),
        )
        .collect()
}

/// Adds `<column>_norm` scaling each column to `[0, 1]` over the whole table.
/// A constant column scales to 0.5.
pub fn normalize_min_max(frame: &DataFrame, columns: &[&str]) -> PolarsResult<DataFrame> {
    let exprs: Vec<Expr> = columns
        .iter()
        .map(|c| min_max(col(*c)).alias(format!("{c}_norm")))
        .collect();
    frame.clone().lazy().with_columns(exprs).collect()
}

/// `value` rescaled to `[0, 1]` over its column, 0.5 where the column has no
/// spread.
pub(crate) fn min_max(value: Expr) -> Expr {
    let value = value.cast(DataType::Float64);
    let range = value.clone().max() - value.clone().min();
    when(range.clone().gt(lit(0.0)))
        .then((value.clone() - value.min()) / range)
        .otherwise(lit(0.5))
}

/// Labels each value of `key` with the entry of `table` it equals, else with
/// `fallback`. Table values are expected to be distinct.
pub(crate) fn lookup(
    key: Expr,
    table: impl IntoIterator<Item = (Expr, &'static str)>,
    fallback: Expr,
) -> Expr {
    table.into_iter().fold(fallback, |otherwise, (value, label)| {
        when(key.clone().eq(value))
            .then(lit(label))
            .otherwise(otherwise)
    })
}

/// Whether `frame` has `column` with an integer or float type.
pub(crate) fn is_numeric_column(frame: &DataFrame, column: &str) -> bool {
    frame
        .column(column)
        .is_ok_and(|c| c.dtype().is_float() || c.dtype().is_integer())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn crops() -> DataFrame {
        df!(
            "field_id" => ["F2", "F1", "F2", "F1", "F1"],
            "year" => [2022i64, 2021, 2021, 2022, 2022],
            "crop_name" => ["Soybeans", "Corn", "Corn", "Soybeans", "Wheat"],
            "acres" => [10.0, 4.0, 6.0, 5.0, 1.0],
        )
        .unwrap()
    }

    #[test]
    fn pre_aggregate_sums_in_key_order() {
        let out = pre_aggregate(&crops(), "field_id", &["acres"], Aggregation::Sum, None).unwrap();
        let ids: Vec<_> = out.column("field_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["F2", "F1"]);
        let acres = out.column("acres").unwrap().f64().unwrap();
        assert_eq!(acres.get(0), Some(16.0));
        assert_eq!(acres.get(1), Some(10.0));
    }

    #[test]
    fn pre_aggregate_last_respects_order() {
        let out = pre_aggregate(
            &crops(),
            "field_id",
            &["crop_name"],
            Aggregation::Last,
            Some("year"),
        )
        .unwrap();
        let ids: Vec<_> = out.column("field_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["F2", "F1"]);
        let crops = out.column("crop_name").unwrap().str().unwrap();
        assert_eq!(crops.get(0), Some("Soybeans"));
        assert_eq!(crops.get(1), Some("Wheat"));
    }

    #[test]
    fn count_ignores_nulls() {
        let frame = df!("field_id" => ["A", "A", "B"], "v" => [Some(1.0), None, None]).unwrap();
        let out = pre_aggregate(&frame, "field_id", &["v"], Aggregation::Count, None).unwrap();
        let counts = out.column("v").unwrap().cast(&DataType::Int64).unwrap();
        let counts = counts.i64().unwrap();
        assert_eq!(counts.get(0), Some(1));
        assert_eq!(counts.get(1), Some(0));
    }

    #[test]
    fn pivots_years_into_columns() {
        let out = pivot_by_period(&crops(), "field_id", "year", "crop_name", "crop").unwrap();
        assert_eq!(
            out.get_column_names_str(),
            vec!["field_id", "crop_2021", "crop_2022"]
        );
        let y22 = out.column("crop_2022").unwrap().str().unwrap();
        assert_eq!(y22.get(0), Some("Soybeans"));
        // F1 has two 2022 records; the first wins.
        assert_eq!(y22.get(1), Some("Soybeans"));
    }

    #[test]
    fn rolling_sum_restarts_per_field() {
        let rain = df!(
            "field_id" => ["F1", "F1", "F1", "F2"],
            "date" => ["2023-05-01", "2023-05-02", "2023-05-03", "2023-05-01"],
            "prectotcorr" => [1.0, 2.0, 4.0, 8.0],
        )
        .unwrap();
        let out = rolling_sum(&rain, "field_id", "date", "prectotcorr", 2).unwrap();
        let sums: Vec<_> = out
            .column("prectotcorr_sum_2")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(sums, vec![1.0, 3.0, 6.0, 8.0]);
    }

    #[test]
    fn normalizes_to_unit_range() {
        let frame = df!("ndvi" => [0.2, 0.6, 0.4], "flat" => [3.0, 3.0, 3.0]).unwrap();
        let out = normalize_min_max(&frame, &["ndvi", "flat"]).unwrap();
        let ndvi: Vec<_> = out.column("ndvi_norm").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert!((ndvi[0] - 0.0).abs() < 1e-12);
        assert!((ndvi[1] - 1.0).abs() < 1e-12);
        assert!((ndvi[2] - 0.5).abs() < 1e-12);
        let flat = out.column("flat_norm").unwrap().f64().unwrap();
        assert_eq!(flat.get(1), Some(0.5));
    }
}
