//! Placeholder generators standing in for the soil survey, weather service,
//! cropland layer and imagery statistics when the real services are down or
//! when a test needs plausible data.
//!
//! Every generator is deterministic for a given seed (the instance seed, or
//! the `seed` parameter, which wins). Without a seed the output differs on
//! every call.

use crate::schema::definition::DatasetKind;
use crate::sources::adapter::{SkippedRecord, SourceAdapter, SourceBatch};
use crate::sources::error::SourceError;
use crate::sources::params::SourceParams;
use crate::types::field::FieldRecord;
use crate::types::geometry::SQUARE_METERS_PER_ACRE;
use async_trait::async_trait;
use bon::bon;
use chrono::{Datelike, NaiveDate};
use log::debug;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

const SOIL_TYPES: [&str; 4] = ["Loam", "Silt Loam", "Clay Loam", "Sandy Loam"];
const DRAINAGE_CLASSES: [&str; 3] = [
    "Well drained",
    "Moderately well drained",
    "Somewhat poorly drained",
];

/// Cropland data layer codes most often seen on corn belt fields.
const CROPS: [(i64, &str); 6] = [
    (1, "Corn"),
    (5, "Soybeans"),
    (24, "Winter Wheat"),
    (28, "Oats"),
    (36, "Alfalfa"),
    (37, "Other Hay/Non Alfalfa"),
];

/// Area of one 10 m imagery pixel, in acres.
const PIXEL_ACRES: f64 = 100.0 / SQUARE_METERS_PER_ACRE;

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn make_rng(seed: Option<u64>, params: &SourceParams) -> Result<StdRng, SourceError> {
    Ok(match params.seed()?.or(seed) {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    })
}

fn ids(fields: &[FieldRecord]) -> Vec<&str> {
    fields.iter().map(|f| f.field_id.as_str()).collect()
}

fn required_date(params: &SourceParams, key: &str) -> Result<NaiveDate, SourceError> {
    params.date(key)?.ok_or_else(|| SourceError::InvalidParameter {
        key: key.to_string(),
        value: String::new(),
        reason: "required by the weather generator".to_string(),
    })
}

/// Soil survey stand-in: one record per field.
#[derive(Debug, Clone)]
pub struct MockSoilSource {
    name: String,
    seed: Option<u64>,
}

#[bon]
impl MockSoilSource {
    #[builder]
    pub fn new(
        #[builder(into, default = "soil".to_string())] name: String,
        seed: Option<u64>,
    ) -> Self {
        Self { name, seed }
    }
}

fn generate_soil(fields: &[FieldRecord], rng: &mut StdRng) -> PolarsResult<DataFrame> {
    let mut soil = Vec::with_capacity(fields.len());
    let mut om = Vec::with_capacity(fields.len());
    let mut ph = Vec::with_capacity(fields.len());
    let mut awc = Vec::with_capacity(fields.len());
    let mut drainage = Vec::with_capacity(fields.len());
    for _ in fields {
        soil.push(*SOIL_TYPES.choose(rng).unwrap_or(&SOIL_TYPES[0]));
        om.push(round_to(rng.random_range(2.0..=5.5), 1));
        ph.push(round_to(rng.random_range(6.0..=7.5), 1));
        awc.push(round_to(rng.random_range(0.12..=0.24), 2));
        drainage.push(*DRAINAGE_CLASSES.choose(rng).unwrap_or(&DRAINAGE_CLASSES[0]));
    }
    df!(
        "field_id" => ids(fields),
        "dominant_soil" => soil,
        "om_pct" => om,
        "ph_water" => ph,
        "awc_r" => awc,
        "drainagecl" => drainage,
    )
}

#[async_trait]
impl SourceAdapter for MockSoilSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        DatasetKind::Soil.as_str()
    }

    async fn fetch(
        &self,
        fields: &[FieldRecord],
        params: &SourceParams,
    ) -> Result<SourceBatch, SourceError> {
        let mut rng = make_rng(self.seed, params)?;
        let frame = generate_soil(fields, &mut rng)?;
        debug!("Generated {} mock soil records", frame.height());
        Ok(SourceBatch::new(frame))
    }
}

/// Cropland layer stand-in: one record per field and requested year
/// (`years` parameter, default 2023).
#[derive(Debug, Clone)]
pub struct MockCropSource {
    name: String,
    seed: Option<u64>,
}

#[bon]
impl MockCropSource {
    #[builder]
    pub fn new(
        #[builder(into, default = "crops".to_string())] name: String,
        seed: Option<u64>,
    ) -> Self {
        Self { name, seed }
    }
}

fn generate_crops(
    fields: &[FieldRecord],
    years: &[i32],
    rng: &mut StdRng,
) -> PolarsResult<DataFrame> {
    let rows = fields.len() * years.len();
    let mut field_ids = Vec::with_capacity(rows);
    let mut year_col = Vec::with_capacity(rows);
    let mut codes = Vec::with_capacity(rows);
    let mut names = Vec::with_capacity(rows);
    for field in fields {
        for &year in years {
            let (code, name) = *CROPS.choose(rng).unwrap_or(&CROPS[0]);
            field_ids.push(field.field_id.as_str());
            year_col.push(year as i64);
            codes.push(code);
            names.push(name);
        }
    }
    df!(
        "field_id" => field_ids,
        "year" => year_col,
        "crop_code" => codes,
        "crop_name" => names,
    )
}

#[async_trait]
impl SourceAdapter for MockCropSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        DatasetKind::Crops.as_str()
    }

    async fn fetch(
        &self,
        fields: &[FieldRecord],
        params: &SourceParams,
    ) -> Result<SourceBatch, SourceError> {
        let years = params.years()?.unwrap_or_else(|| vec![2023]);
        let mut rng = make_rng(self.seed, params)?;
        let frame = generate_crops(fields, &years, &mut rng)?;
        debug!(
            "Generated {} mock crop records for {} years",
            frame.height(),
            years.len()
        );
        Ok(SourceBatch::new(frame))
    }
}

/// Daily weather stand-in between the required `start_date` and `end_date`
/// parameters, inclusive. Temperatures follow the season of the field's
/// hemisphere.
#[derive(Debug, Clone)]
pub struct MockWeatherSource {
    name: String,
    seed: Option<u64>,
}

#[bon]
impl MockWeatherSource {
    #[builder]
    pub fn new(
        #[builder(into, default = "weather".to_string())] name: String,
        seed: Option<u64>,
    ) -> Self {
        Self { name, seed }
    }
}

struct WeatherColumns {
    field_id: Vec<String>,
    date: Vec<String>,
    t2m: Vec<f64>,
    t2m_min: Vec<f64>,
    t2m_max: Vec<f64>,
    prectotcorr: Vec<f64>,
    rh2m: Vec<f64>,
    ws10m: Vec<f64>,
}

fn generate_weather(
    fields: &[FieldRecord],
    days: &[NaiveDate],
    rng: &mut StdRng,
) -> PolarsResult<DataFrame> {
    let rows = fields.len() * days.len();
    let mut cols = WeatherColumns {
        field_id: Vec::with_capacity(rows),
        date: Vec::with_capacity(rows),
        t2m: Vec::with_capacity(rows),
        t2m_min: Vec::with_capacity(rows),
        t2m_max: Vec::with_capacity(rows),
        prectotcorr: Vec::with_capacity(rows),
        rh2m: Vec::with_capacity(rows),
        ws10m: Vec::with_capacity(rows),
    };
    for field in fields {
        let southern = field.centroid().is_some_and(|c| c.y() < 0.0);
        for day in days {
            // Warmest around day 196 in the north, day 15 in the south.
            let peak = if southern { 15.0 } else { 196.0 };
            let phase = (day.ordinal() as f64 - peak) / 365.25 * std::f64::consts::TAU;
            let mean = 12.0 + 13.0 * phase.cos() + rng.random_range(-3.0..=3.0);
            let spread = rng.random_range(3.0..=8.0);
            let rain = if rng.random_bool(0.3) {
                rng.random_range(0.1..=25.0)
            } else {
                0.0
            };

            cols.field_id.push(field.field_id.clone());
            cols.date.push(day.format("%Y-%m-%d").to_string());
            cols.t2m.push(round_to(mean, 2));
            cols.t2m_min.push(round_to(mean - spread, 2));
            cols.t2m_max.push(round_to(mean + spread, 2));
            cols.prectotcorr.push(round_to(rain, 1));
            cols.rh2m.push(round_to(rng.random_range(40.0..=95.0), 1));
            cols.ws10m.push(round_to(rng.random_range(1.0..=8.0), 2));
        }
    }
    df!(
        "field_id" => cols.field_id,
        "date" => cols.date,
        "t2m" => cols.t2m,
        "t2m_min" => cols.t2m_min,
        "t2m_max" => cols.t2m_max,
        "prectotcorr" => cols.prectotcorr,
        "rh2m" => cols.rh2m,
        "ws10m" => cols.ws10m,
    )
}

#[async_trait]
impl SourceAdapter for MockWeatherSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        DatasetKind::Weather.as_str()
    }

    async fn fetch(
        &self,
        fields: &[FieldRecord],
        params: &SourceParams,
    ) -> Result<SourceBatch, SourceError> {
        let start = required_date(params, "start_date")?;
        let end = required_date(params, "end_date")?;
        if end < start {
            return Err(SourceError::InvalidParameter {
                key: "end_date".to_string(),
                value: end.to_string(),
                reason: format!("before start_date {start}"),
            });
        }
        let days: Vec<NaiveDate> = start.iter_days().take_while(|d| *d <= end).collect();
        let mut rng = make_rng(self.seed, params)?;
        let frame = generate_weather(fields, &days, &mut rng)?;
        debug!(
            "Generated {} mock weather records ({} days)",
            frame.height(),
            days.len()
        );
        Ok(SourceBatch::new(frame))
    }
}

/// NDVI zonal statistics stand-in. Fields smaller than one 10 m pixel have
/// no statistics and are reported as skipped.
#[derive(Debug, Clone)]
pub struct MockImageryStatsSource {
    name: String,
    seed: Option<u64>,
}

#[bon]
impl MockImageryStatsSource {
    #[builder]
    pub fn new(
        #[builder(into, default = "imagery".to_string())] name: String,
        seed: Option<u64>,
    ) -> Self {
        Self { name, seed }
    }
}

fn generate_ndvi(
    fields: &[FieldRecord],
    rng: &mut StdRng,
) -> PolarsResult<(DataFrame, Vec<SkippedRecord>)> {
    let mut skipped = Vec::new();
    let mut field_ids = Vec::with_capacity(fields.len());
    let (mut mean, mut sd, mut min, mut max, mut median) =
        (Vec::new(), Vec::new(), Vec::new(), Vec::new(), Vec::new());
    for field in fields {
        if field.area_acres < PIXEL_ACRES {
            skipped.push(SkippedRecord::new(
                field.field_id.as_str(),
                "field is smaller than one imagery pixel",
            ));
            continue;
        }
        let m: f64 = rng.random_range(0.2..=0.85);
        let s: f64 = rng.random_range(0.02..=0.12);
        field_ids.push(field.field_id.as_str());
        mean.push(round_to(m, 3));
        sd.push(round_to(s, 3));
        min.push(round_to((m - 2.5 * s).max(-1.0), 3));
        max.push(round_to((m + 2.5 * s).min(1.0), 3));
        median.push(round_to(m + rng.random_range(-0.5..=0.5) * s, 3));
    }
    let frame = df!(
        "field_id" => field_ids,
        "ndvi_mean" => mean,
        "ndvi_std" => sd,
        "ndvi_min" => min,
        "ndvi_max" => max,
        "ndvi_median" => median,
    )?;
    Ok((frame, skipped))
}

#[async_trait]
impl SourceAdapter for MockImageryStatsSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        DatasetKind::ImageryStats.as_str()
    }

    async fn fetch(
        &self,
        fields: &[FieldRecord],
        params: &SourceParams,
    ) -> Result<SourceBatch, SourceError> {
        let mut rng = make_rng(self.seed, params)?;
        let (frame, skipped) = generate_ndvi(fields, &mut rng)?;
        Ok(SourceBatch::new(frame).with_skipped(skipped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, MultiPolygon};

    fn fields() -> Vec<FieldRecord> {
        ["F1", "F2", "F3"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let x = -93.6 + i as f64 * 0.02;
                let square = MultiPolygon(vec![polygon![
                    (x: x, y: 41.5),
                    (x: x + 0.01, y: 41.5),
                    (x: x + 0.01, y: 41.51),
                    (x: x, y: 41.51),
                ]]);
                FieldRecord::new(*id, square).unwrap()
            })
            .collect()
    }

    #[tokio::test]
    async fn seeded_soil_is_repeatable_and_in_range() {
        let source = MockSoilSource::builder().seed(11).build();
        let a = source.fetch(&fields(), &SourceParams::new()).await.unwrap();
        let b = source.fetch(&fields(), &SourceParams::new()).await.unwrap();
        assert!(a.frame.equals(&b.frame));
        assert_eq!(a.frame.height(), 3);

        let om = a.frame.column("om_pct").unwrap().f64().unwrap();
        assert!(om.into_iter().flatten().all(|v| (2.0..=5.5).contains(&v)));
        let soil = a.frame.column("dominant_soil").unwrap().str().unwrap();
        assert!(soil.into_iter().flatten().all(|s| SOIL_TYPES.contains(&s)));
    }

    #[tokio::test]
    async fn seed_parameter_overrides_instance_seed() {
        let source = MockSoilSource::builder().seed(1).build();
        let params = SourceParams::new().with("seed", 2);
        let a = source.fetch(&fields(), &params).await.unwrap();
        let b = MockSoilSource::builder()
            .seed(2)
            .build()
            .fetch(&fields(), &SourceParams::new())
            .await
            .unwrap();
        assert!(a.frame.equals(&b.frame));
    }

    #[tokio::test]
    async fn crops_cover_every_year() {
        let source = MockCropSource::builder().seed(3).build();
        let params = SourceParams::new().with("years", "2021-2023");
        let batch = source.fetch(&fields(), &params).await.unwrap();
        assert_eq!(batch.frame.height(), 9);
    }

    #[tokio::test]
    async fn weather_spans_inclusive_range() {
        let source = MockWeatherSource::builder().seed(5).build();
        let params = SourceParams::new()
            .with("start_date", "2024-05-01")
            .with("end_date", "2024-05-07");
        let batch = source.fetch(&fields(), &params).await.unwrap();
        assert_eq!(batch.frame.height(), 21);

        let min = batch.frame.column("t2m_min").unwrap().f64().unwrap();
        let max = batch.frame.column("t2m_max").unwrap().f64().unwrap();
        assert!(min
            .into_iter()
            .zip(max.into_iter())
            .all(|(lo, hi)| lo.unwrap() < hi.unwrap()));
    }

    #[tokio::test]
    async fn weather_requires_dates() {
        let source = MockWeatherSource::builder().build();
        let err = source
            .fetch(&fields(), &SourceParams::new().with("start_date", "2024-05-01"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn tiny_fields_are_skipped_by_imagery() {
        let mut all = fields();
        let speck = MultiPolygon(vec![polygon![
            (x: -93.0, y: 41.5),
            (x: -93.00001, y: 41.5),
            (x: -93.00001, y: 41.50001),
            (x: -93.0, y: 41.50001),
        ]]);
        all.push(FieldRecord::new("SPECK", speck).unwrap());

        let source = MockImageryStatsSource::builder().seed(9).build();
        let batch = source.fetch(&all, &SourceParams::new()).await.unwrap();
        assert_eq!(batch.frame.height(), 3);
        assert_eq!(batch.skipped.len(), 1);
        assert_eq!(batch.skipped[0].field_id, "SPECK");
    }
}
