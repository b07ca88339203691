use bon::builder;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Base temperature of the growing degree day formula, °C.
pub const GDD_BASE_C: f64 = 10.0;
/// Daily mean temperatures above this are counted as this, °C.
pub const GDD_CAP_C: f64 = 30.0;

/// Adds daily `gdd` and per-field running `gdd_cumulative` columns.
///
/// A day contributes its mean of `tmin` and `tmax`, capped at `cap`, less
/// `base`, and never less than zero. Rows are sorted by key then date.
///
/// ```
/// use fieldjoin::reshape::growing_degree_days;
/// use polars::prelude::*;
///
/// let weather = df!(
///     "field_id" => ["F1", "F1"],
///     "date" => ["2023-05-01", "2023-05-02"],
///     "t2m_min" => [8.0, 14.0],
///     "t2m_max" => [20.0, 34.0],
/// )?;
/// let out = growing_degree_days().frame(&weather).call()?;
/// let total = out.column("gdd_cumulative")?.f64()?.get(1);
/// assert_eq!(total, Some(4.0 + 14.0));
/// # Ok::<(), PolarsError>(())
/// ```
#[builder]
pub fn growing_degree_days(
    frame: &DataFrame,
    #[builder(default = "field_id")] key: &str,
    #[builder(default = "date")] date: &str,
    #[builder(default = "t2m_min")] tmin: &str,
    #[builder(default = "t2m_max")] tmax: &str,
    #[builder(default = GDD_BASE_C)] base: f64,
    #[builder(default = GDD_CAP_C)] cap: f64,
) -> PolarsResult<DataFrame> {
    let mean = (col(tmin).cast(DataType::Float64) + col(tmax).cast(DataType::Float64)) / lit(2.0);
    let capped = when(mean.clone().gt(lit(cap)))
        .then(lit(cap))
        .otherwise(mean);
    let excess = capped - lit(base);
    let gdd = when(excess.clone().lt(lit(0.0)))
        .then(lit(0.0))
        .otherwise(excess);
    frame
        .clone()
        .lazy()
        .sort([key, date], SortMultipleOptions::default().with_maintain_order(true))
        .with_column(gdd.alias("gdd"))
        .with_column(
            col("gdd")
                .cum_sum(false)
                .over([col(key)])
                .alias("gdd_cumulative"),
        )
        .collect()
}

/// Months a weather summary covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    /// May through September.
    Growing,
    Spring,
    Summer,
    Fall,
    /// December, January and February.
    Winter,
    All,
}

impl Season {
    /// Calendar months, 1-based. Empty for [`Season::All`].
    pub fn months(self) -> &'static [i32] {
        match self {
            Season::Growing => &[5, 6, 7, 8, 9],
            Season::Spring => &[3, 4, 5],
            Season::Summer => &[6, 7, 8],
            Season::Fall => &[9, 10, 11],
            Season::Winter => &[12, 1, 2],
            Season::All => &[],
        }
    }
}

const SEASON_EXTREMES: [&str; 2] = ["t2m_min", "t2m_max"];
const SEASON_TOTALS: [&str; 2] = ["prectotcorr", "allsky_sfc_sw_dwn"];

/// One row per field summarizing the days of `season`.
///
/// For each of `t2m_min` and `t2m_max` present: `<column>_min`, `_mean` and
/// `_max`. For each of `prectotcorr` and `allsky_sfc_sw_dwn` present:
/// `<column>_sum`. `date` may be a date column or ISO `YYYY-MM-DD` text.
#[builder]
pub fn seasonal_summary(
    frame: &DataFrame,
    season: Season,
    #[builder(default = "field_id")] key: &str,
    #[builder(default = "date")] date: &str,
) -> PolarsResult<DataFrame> {
    let day = match frame.column(date)?.dtype() {
        DataType::String => col(date).str().to_date(StrptimeOptions {
            format: Some("%Y-%m-%d".into()),
            ..Default::default()
        }),
        _ => col(date).cast(DataType::Date),
    };
    let month = day.dt().month().cast(DataType::Int32);

    let mut aggs = Vec::new();
    for c in SEASON_EXTREMES.into_iter().filter(|c| frame.column(c).is_ok()) {
        aggs.push(col(c).min().alias(format!("{c}_min")));
        aggs.push(col(c).mean().alias(format!("{c}_mean")));
        aggs.push(col(c).max().alias(format!("{c}_max")));
    }
    for c in SEASON_TOTALS.into_iter().filter(|c| frame.column(c).is_ok()) {
        aggs.push(col(c).sum().alias(format!("{c}_sum")));
    }

    let mut lazy = frame.clone().lazy();
    let in_season = season
        .months()
        .iter()
        .map(|m| month.clone().eq(lit(*m)))
        .reduce(|a, b| a.or(b));
    if let Some(in_season) = in_season {
        lazy = lazy.filter(in_season);
    }
    lazy.group_by_stable([col(key)]).agg(aggs).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gdd_caps_the_mean_and_accumulates_per_field() {
        let weather = df!(
            "field_id" => ["F2", "F1", "F1"],
            "date" => ["2023-05-01", "2023-05-02", "2023-05-01"],
            "t2m_min" => [0.0, 14.0, 8.0],
            "t2m_max" => [5.0, 34.0, 20.0],
        )
        .unwrap();
        let out = growing_degree_days().frame(&weather).call().unwrap();

        let gdd = out.column("gdd").unwrap().f64().unwrap();
        let cumulative = out.column("gdd_cumulative").unwrap().f64().unwrap();
        // F1 05-01: (8 + 20) / 2 - 10
        assert_eq!(gdd.get(0), Some(4.0));
        // F1 05-02: (14 + 34) / 2 - 10, the mean being under the cap
        assert_eq!(gdd.get(1), Some(14.0));
        assert_eq!(cumulative.get(1), Some(18.0));
        // F2 never warms past the base.
        assert_eq!(gdd.get(2), Some(0.0));
        assert_eq!(cumulative.get(2), Some(0.0));
    }

    #[test]
    fn gdd_cap_applies_to_the_daily_mean() {
        let weather = df!(
            "field_id" => ["F1", "F1"],
            "date" => ["2023-07-01", "2023-07-02"],
            "t2m_min" => [0.0, 28.0],
            "t2m_max" => [30.0, 40.0],
        )
        .unwrap();
        let out = growing_degree_days().frame(&weather).call().unwrap();
        let gdd: Vec<_> = out.column("gdd").unwrap().f64().unwrap().into_no_null_iter().collect();
        // A mean of 15 counts in full even though tmin is below the base.
        // A mean of 34 is capped at 30.
        assert_eq!(gdd, vec![5.0, 20.0]);
    }

    fn season_weather() -> DataFrame {
        df!(
            "field_id" => ["F1", "F1", "F1", "F2"],
            "date" => ["2023-01-15", "2023-06-01", "2023-07-01", "2023-06-10"],
            "t2m_min" => [-10.0, 12.0, 16.0, 11.0],
            "t2m_max" => [0.0, 24.0, 30.0, 25.0],
            "prectotcorr" => [1.0, 2.0, 3.0, 5.0],
        )
        .unwrap()
    }

    #[test]
    fn growing_season_skips_winter_days() {
        let out = seasonal_summary()
            .frame(&season_weather())
            .season(Season::Growing)
            .call()
            .unwrap();
        assert_eq!(
            out.get_column_names_str(),
            vec![
                "field_id",
                "t2m_min_min",
                "t2m_min_mean",
                "t2m_min_max",
                "t2m_max_min",
                "t2m_max_mean",
                "t2m_max_max",
                "prectotcorr_sum",
            ]
        );
        let ids: Vec<_> = out.column("field_id").unwrap().str().unwrap().into_no_null_iter().collect();
        assert_eq!(ids, vec!["F1", "F2"]);
        let lows = out.column("t2m_min_min").unwrap().f64().unwrap();
        assert_eq!(lows.get(0), Some(12.0));
        let rain = out.column("prectotcorr_sum").unwrap().f64().unwrap();
        assert_eq!(rain.get(0), Some(5.0));
        assert_eq!(rain.get(1), Some(5.0));
    }

    #[test]
    fn all_season_keeps_every_day_of_a_date_column() {
        let mut weather = season_weather();
        let dates = weather
            .column("date")
            .unwrap()
            .as_materialized_series()
            .str()
            .unwrap()
            .as_date(Some("%Y-%m-%d"), false)
            .unwrap()
            .into_series();
        weather.with_column(dates).unwrap();

        let out = seasonal_summary()
            .frame(&weather)
            .season(Season::All)
            .call()
            .unwrap();
        let rain = out.column("prectotcorr_sum").unwrap().f64().unwrap();
        assert_eq!(rain.get(0), Some(6.0));

        let winter = seasonal_summary()
            .frame(&weather)
            .season(Season::Winter)
            .call()
            .unwrap();
        assert_eq!(winter.height(), 1);
    }
}
