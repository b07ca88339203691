use super::lookup;
use polars::prelude::*;

/// Column written by [`classify_crop_type`].
pub const CROP_CATEGORY_COLUMN: &str = "crop_category";

/// Cropland Data Layer codes grouped by category. Other codes are `Other`.
pub const CROP_CATEGORIES: [(&[i64], &str); 5] = [
    (&[1, 2, 3, 4, 5, 6], "Row Crops"),
    (&[21, 22, 23, 24, 27, 28], "Small Grains"),
    (&[36, 37, 62, 176], "Forage"),
    (&[61], "Fallow"),
    (&[63], "Forest"),
];

/// One row per field describing its crop history:
/// `rotation_count`, `crop_sequence` (crop codes by year) and `year_count`.
///
/// A year counts towards `rotation_count` when its crop differs from the
/// previous year's. The first year has no previous crop and always counts.
pub fn analyze_rotation(frame: &DataFrame, key: &str) -> PolarsResult<DataFrame> {
    let previous = col("crop_code").shift(lit(1)).over([col(key)]);
    frame
        .clone()
        .lazy()
        .sort([key, "year"], SortMultipleOptions::default().with_maintain_order(true))
        .with_column(col("crop_code").neq_missing(previous).alias("changed"))
        .group_by_stable([col(key)])
        .agg([
            col("changed").sum().cast(DataType::Int64).alias("rotation_count"),
            col("crop_code").alias("crop_sequence"),
            col("year").count().cast(DataType::Int64).alias("year_count"),
        ])
        .collect()
}

/// The `top_n` most frequent `crop_name` values with their `count` and
/// `percentage` of all non-null records, rounded to two decimals. Ties keep
/// order of first appearance.
pub fn dominant_crops(frame: &DataFrame, top_n: usize) -> PolarsResult<DataFrame> {
    let names = frame.column("crop_name")?;
    let total = names.len() - names.null_count();
    let mut counts = frame
        .clone()
        .lazy()
        .filter(col("crop_name").is_not_null())
        .group_by_stable([col("crop_name")])
        .agg([len().cast(DataType::Int64).alias("count")])
        .sort(
            ["count"],
            SortMultipleOptions::default()
                .with_order_descending(true)
                .with_maintain_order(true),
        )
        .limit(top_n as IdxSize)
        .collect()?;

    let percentage: Vec<f64> = counts
        .column("count")?
        .i64()?
        .into_no_null_iter()
        .map(|n| (n as f64 / total as f64 * 10_000.0).round() / 100.0)
        .collect();
    counts.with_column(Column::new("percentage".into(), percentage))?;
    Ok(counts)
}

/// Adds [`CROP_CATEGORY_COLUMN`] from a crop code column.
pub fn classify_crop_type(frame: &DataFrame, column: &str) -> PolarsResult<DataFrame> {
    frame.column(column)?;
    let table = CROP_CATEGORIES
        .into_iter()
        .flat_map(|(codes, category)| codes.iter().map(move |code| (lit(*code), category)));
    let category = lookup(col(column).cast(DataType::Int64), table, lit("Other"));
    frame
        .clone()
        .lazy()
        .with_column(category.alias(CROP_CATEGORY_COLUMN))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> DataFrame {
        df!(
            "field_id" => ["F2", "F1", "F1", "F1", "F2"],
            "year" => [2022i64, 2023, 2021, 2022, 2021],
            "crop_code" => [5i64, 1, 1, 5, 5],
            "crop_name" => ["Soybeans", "Corn", "Corn", "Soybeans", "Soybeans"],
        )
        .unwrap()
    }

    #[test]
    fn rotation_counts_changes_in_year_order() {
        let out = analyze_rotation(&history(), "field_id").unwrap();
        let ids: Vec<_> = out.column("field_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["F1", "F2"]);

        let rotations = out.column("rotation_count").unwrap().i64().unwrap();
        // F1: corn, soybeans, corn
        assert_eq!(rotations.get(0), Some(3));
        // F2: soybeans twice
        assert_eq!(rotations.get(1), Some(1));

        let years = out.column("year_count").unwrap().i64().unwrap();
        assert_eq!(years.get(0), Some(3));

        let sequence = out.column("crop_sequence").unwrap().list().unwrap().get_as_series(0).unwrap();
        let codes: Vec<_> = sequence.i64().unwrap().into_no_null_iter().collect();
        assert_eq!(codes, vec![1, 5, 1]);
    }

    #[test]
    fn dominant_crops_ranks_and_rounds() {
        let out = dominant_crops(&history(), 1).unwrap();
        assert_eq!(out.height(), 1);
        assert_eq!(out.column("crop_name").unwrap().str().unwrap().get(0), Some("Soybeans"));
        assert_eq!(out.column("count").unwrap().i64().unwrap().get(0), Some(3));
        assert_eq!(out.column("percentage").unwrap().f64().unwrap().get(0), Some(60.0));

        let thirds = df!("crop_name" => [Some("Corn"), Some("Oats"), Some("Oats"), None]).unwrap();
        let out = dominant_crops(&thirds, 5).unwrap();
        let percentage = out.column("percentage").unwrap().f64().unwrap();
        assert_eq!(percentage.get(0), Some(66.67));
        assert_eq!(percentage.get(1), Some(33.33));
    }

    #[test]
    fn crop_codes_map_to_categories() {
        let frame = df!("crop_code" => [Some(1i64), Some(24), Some(176), Some(61), Some(63), Some(111), None]).unwrap();
        let out = classify_crop_type(&frame, "crop_code").unwrap();
        let categories: Vec<_> = out
            .column(CROP_CATEGORY_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(
            categories,
            vec!["Row Crops", "Small Grains", "Forage", "Fallow", "Forest", "Other", "Other"]
        );
    }
}
