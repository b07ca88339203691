use fieldjoin::{
    build_field_set, read_geojson, ConfiguredSource, FieldInput, FieldSummary, GeoJsonSink,
    MockCropSource, MockImageryStatsSource, MockSoilSource, MockWeatherSource, Pipeline,
    SourceAdapter, SourceParams, FIELD_ID,
};
use std::env;
use std::sync::Arc;

const FIELDS: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    {"type": "Feature", "properties": {"field_id": "IA-001", "owner": "Hansen", "region": "Story"},
     "geometry": {"type": "Polygon", "coordinates": [[[-93.62, 41.58], [-93.61, 41.58], [-93.61, 41.59], [-93.62, 41.59], [-93.62, 41.58]]]}},
    {"type": "Feature", "properties": {"field_id": "IA-002", "owner": "Ortiz", "region": "Story"},
     "geometry": {"type": "Polygon", "coordinates": [[[-93.60, 41.58], [-93.595, 41.58], [-93.595, 41.585], [-93.60, 41.585], [-93.60, 41.58]]]}},
    {"type": "Feature", "properties": {"field_id": "IA-003", "region": "Polk"},
     "geometry": {"type": "Polygon", "coordinates": [[[-93.58, 41.60], [-93.56, 41.60], [-93.56, 41.61], [-93.58, 41.61], [-93.58, 41.60]]]}}
  ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    configure_polars_display();

    let dir = tempfile::tempdir()?;
    let input = dir.path().join("fields.geojson");
    let output = dir.path().join("merged.geojson");
    std::fs::write(&input, FIELDS)?;

    let mut spine = read_geojson(&input, FIELD_ID).await?;
    let records = build_field_set(&mut spine, FIELD_ID)?;
    let summary = FieldSummary::from_field_set(&spine, &records)?;
    println!("{}", summary.to_markdown());

    let season = SourceParams::new()
        .with("start_date", "2023-05-01")
        .with("end_date", "2023-05-14")
        .with("years", "2021-2023");

    let mut pipeline = Pipeline::builder()
        .fields(FieldInput::GeoJson(input))
        .sources(vec![
            source(MockSoilSource::builder().seed(7).build(), &season),
            source(MockWeatherSource::builder().seed(7).build(), &season),
            source(MockCropSource::builder().seed(7).build(), &season),
            source(MockImageryStatsSource::builder().seed(7).build(), &season),
        ])
        .sink(Arc::new(GeoJsonSink::new(&output)))
        .concurrent(true)
        .build();

    let result = pipeline.run().await?;
    println!("{:#?}", result.dataset.frame());
    println!("{}", result.report.to_markdown());
    println!("Wrote {}", output.display());

    Ok(())
}

fn source(adapter: impl SourceAdapter + 'static, params: &SourceParams) -> ConfiguredSource {
    ConfiguredSource::builder()
        .adapter(Arc::new(adapter))
        .params(params.clone())
        .build()
}

fn configure_polars_display() {
    // wide joined tables
    env::set_var("POLARS_FMT_MAX_COLS", "-1");
    env::set_var("POLARS_FMT_MAX_ROWS", "20");
}
