use crate::error::PipelineError;
use crate::io::geojson::read_geojson;
use crate::io::sink::Sink;
use crate::join::dataset::JoinedDataset;
use crate::join::engine::{join, AttributeSet};
use crate::join::error::JoinError;
use crate::join::report::JoinReport;
use crate::schema::definition::{DatasetKind, Schema};
use crate::schema::registry::SchemaRegistry;
use crate::sources::adapter::{SourceAdapter, SourceBatch};
use crate::sources::error::SourceError;
use crate::sources::params::SourceParams;
use crate::standardize::standardizer::{standardize, standardize_spatial};
use crate::types::crs::Crs;
use crate::types::field::{build_field_set, FieldRecord};
use crate::types::spatial_frame::SpatialFrame;
use bon::bon;
use futures_util::future::join_all;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Not yet run, or reset.
    Ready,
    Collecting,
    Joining,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PipelineState::Ready => "ready",
            PipelineState::Collecting => "collecting",
            PipelineState::Joining => "joining",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        })
    }
}

/// Where the field boundaries come from.
#[derive(Debug, Clone)]
pub enum FieldInput {
    Frame(SpatialFrame),
    GeoJson(PathBuf),
}

/// An adapter plus the policy the orchestrator applies to it.
#[derive(Clone)]
pub struct ConfiguredSource {
    adapter: Arc<dyn SourceAdapter>,
    params: SourceParams,
    required: bool,
    timeout: Option<Duration>,
}

#[bon]
impl ConfiguredSource {
    #[builder]
    pub fn new(
        adapter: Arc<dyn SourceAdapter>,
        #[builder(default)] params: SourceParams,
        /// A failure of a required source fails the run instead of joining as
        /// defaults.
        #[builder(default)]
        required: bool,
        /// Overrides the pipeline's default timeout.
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            adapter,
            params,
            required,
            timeout,
        }
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }
}

impl fmt::Debug for ConfiguredSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfiguredSource")
            .field("name", &self.adapter.name())
            .field("kind", &self.adapter.kind())
            .field("params", &self.params)
            .field("required", &self.required)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub dataset: JoinedDataset,
    pub report: JoinReport,
}

/// Collects every configured source for a field set, joins them and hands
/// the result to the sink.
///
/// An instance runs once. A second [`Pipeline::run`] fails with
/// [`PipelineError::AlreadyRan`] until [`Pipeline::reset`] is called.
pub struct Pipeline {
    fields: FieldInput,
    id_property: Option<String>,
    registry: Arc<SchemaRegistry>,
    sources: Vec<ConfiguredSource>,
    sink: Option<Arc<dyn Sink>>,
    concurrent: bool,
    assume_crs: Option<Crs>,
    default_timeout: Option<Duration>,
    state: PipelineState,
}

#[bon]
impl Pipeline {
    #[builder]
    pub fn new(
        fields: FieldInput,
        /// Column or GeoJSON property holding the field id, when it is not
        /// the schema's key column.
        #[builder(into)]
        id_property: Option<String>,
        #[builder(default = SchemaRegistry::global())] registry: Arc<SchemaRegistry>,
        #[builder(default)] sources: Vec<ConfiguredSource>,
        sink: Option<Arc<dyn Sink>>,
        /// Run adapters in parallel tasks instead of one after another.
        #[builder(default)]
        concurrent: bool,
        /// Reference of a [`FieldInput::Frame`] that carries none. GeoJSON
        /// input without a `crs` member is always WGS84.
        assume_crs: Option<Crs>,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            fields,
            id_property,
            registry,
            sources,
            sink,
            concurrent,
            assume_crs,
            default_timeout,
            state: PipelineState::Ready,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Makes the instance runnable again.
    pub fn reset(&mut self) {
        self.state = PipelineState::Ready;
    }

    pub async fn run(&mut self) -> Result<PipelineOutput, PipelineError> {
        if self.state != PipelineState::Ready {
            return Err(PipelineError::AlreadyRan(self.state));
        }
        let started = Instant::now();
        self.transition(PipelineState::Collecting);
        let result = self.execute().await;
        match &result {
            Ok(output) => {
                self.transition(PipelineState::Done);
                info!(
                    "Pipeline finished in {:.2?}: {} fields, {} sources",
                    started.elapsed(),
                    output.dataset.height(),
                    output.report.sources.len()
                );
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                warn!("Pipeline failed: {e}");
            }
        }
        result
    }

    fn transition(&mut self, next: PipelineState) {
        info!("Pipeline {} -> {}", self.state, next);
        self.state = next;
    }

    async fn execute(&mut self) -> Result<PipelineOutput, PipelineError> {
        let fields_schema = self.registry.get(DatasetKind::Fields.as_str())?.clone();
        let key_column = fields_schema.key_column().to_string();

        let id_column = self.id_property.as_deref().unwrap_or(&key_column);
        let mut raw = match &self.fields {
            FieldInput::Frame(frame) => frame.clone(),
            FieldInput::GeoJson(path) => read_geojson(path, id_column).await?,
        };
        if id_column != key_column && raw.frame().get_column_index(id_column).is_some() {
            raw.frame_mut().rename(id_column, key_column.as_str().into())?;
        }
        let mut spine = standardize_spatial(raw, &fields_schema, self.assume_crs)
            .map_err(|e| PipelineError::standardize(fields_schema.kind(), e))?;
        let records = build_field_set(&mut spine, &key_column)?;
        ensure_unique_ids(&records)?;
        info!("Field set holds {} fields", records.len());

        let schemas = self.source_schemas()?;
        let records: Arc<[FieldRecord]> = records.into();
        let outcomes = if self.concurrent {
            self.collect_concurrently(&records).await
        } else {
            self.collect_sequentially(&records).await
        };

        let mut sets = Vec::with_capacity(self.sources.len());
        for ((source, schema), outcome) in self.sources.iter().zip(schemas).zip(outcomes) {
            sets.push(attribute_set(source, schema, outcome)?);
        }

        self.transition(PipelineState::Joining);
        let (dataset, report) = join(spine, &key_column, &sets)?;

        if let Some(sink) = &self.sink {
            info!("Writing dataset to {}", sink.target());
            sink.write(&dataset, &report).await?;
        }
        Ok(PipelineOutput { dataset, report })
    }

    /// Resolves every source's schema and checks names before any adapter
    /// runs.
    fn source_schemas(&self) -> Result<Vec<Schema>, PipelineError> {
        let mut names = HashSet::new();
        self.sources
            .iter()
            .map(|source| {
                if !names.insert(source.name()) {
                    return Err(JoinError::DuplicateSourceName(source.name().to_string()).into());
                }
                Ok(self.registry.get(source.adapter.kind())?.clone())
            })
            .collect()
    }

    fn timeout_for(&self, source: &ConfiguredSource) -> Option<Duration> {
        source.timeout.or(self.default_timeout)
    }

    async fn collect_sequentially(
        &self,
        records: &Arc<[FieldRecord]>,
    ) -> Vec<Result<SourceBatch, SourceError>> {
        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            let task = spawn_fetch(source, records, self.timeout_for(source));
            outcomes.push(flatten(task.await));
        }
        outcomes
    }

    async fn collect_concurrently(
        &self,
        records: &Arc<[FieldRecord]>,
    ) -> Vec<Result<SourceBatch, SourceError>> {
        let tasks = self
            .sources
            .iter()
            .map(|source| spawn_fetch(source, records, self.timeout_for(source)));
        join_all(tasks).await.into_iter().map(flatten).collect()
    }
}

fn ensure_unique_ids(records: &[FieldRecord]) -> Result<(), JoinError> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.field_id.as_str()) {
            return Err(JoinError::DuplicateFieldId {
                field_id: record.field_id.clone(),
            });
        }
    }
    Ok(())
}

/// Runs one adapter in its own task so that a panic stays inside it.
fn spawn_fetch(
    source: &ConfiguredSource,
    records: &Arc<[FieldRecord]>,
    timeout: Option<Duration>,
) -> tokio::task::JoinHandle<Result<SourceBatch, SourceError>> {
    let adapter = Arc::clone(&source.adapter);
    let params = source.params.clone();
    let records = Arc::clone(records);
    tokio::spawn(async move {
        let started = Instant::now();
        let fetch = adapter.fetch(&records, &params);
        let result = match timeout {
            Some(after) => tokio::time::timeout(after, fetch)
                .await
                .unwrap_or_else(|_| {
                    Err(SourceError::Timeout {
                        name: adapter.name().to_string(),
                        after,
                    })
                }),
            None => fetch.await,
        };
        if let Ok(batch) = &result {
            info!(
                "Source '{}' returned {} records in {:.2?}",
                adapter.name(),
                batch.frame.height(),
                started.elapsed()
            );
        }
        result
    })
}

fn flatten(
    joined: Result<Result<SourceBatch, SourceError>, tokio::task::JoinError>,
) -> Result<SourceBatch, SourceError> {
    joined.unwrap_or_else(|e| Err(SourceError::TaskJoin(e)))
}

/// Standardizes a fetched batch, or downgrades a failure to an empty set.
fn attribute_set(
    source: &ConfiguredSource,
    schema: Schema,
    outcome: Result<SourceBatch, SourceError>,
) -> Result<AttributeSet, PipelineError> {
    let name = source.name().to_string();
    match outcome {
        Ok(batch) => {
            let frame = standardize(&batch.frame, &schema)
                .map_err(|e| PipelineError::standardize(&name, e))?;
            if !batch.skipped.is_empty() {
                warn!(
                    "Source '{}' skipped {} fields",
                    name,
                    batch.skipped.len()
                );
            }
            Ok(AttributeSet::new(name, schema, frame).with_skipped(batch.skipped))
        }
        Err(error) if error.is_fatal() => Err(PipelineError::Source {
            source_name: name,
            source: error,
        }),
        Err(error) if source.required => Err(PipelineError::RequiredSourceFailed {
            source_name: name,
            source: error,
        }),
        Err(error) => {
            warn!("Source '{name}' unavailable, joining defaults: {error}");
            Ok(AttributeSet::failed(name, schema, error.to_string())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::report::SourceStatus;
    use crate::sources::mock::MockSoilSource;
    use crate::sources::static_source::StaticSource;
    use async_trait::async_trait;
    use geo::{polygon, MultiPolygon};
    use polars::prelude::*;

    struct Unavailable;

    #[async_trait]
    impl SourceAdapter for Unavailable {
        fn name(&self) -> &str {
            "weather"
        }
        fn kind(&self) -> &str {
            "weather"
        }
        async fn fetch(
            &self,
            _fields: &[FieldRecord],
            _params: &SourceParams,
        ) -> Result<SourceBatch, SourceError> {
            Err(SourceError::unavailable("weather", "service down"))
        }
    }

    struct Slow;

    #[async_trait]
    impl SourceAdapter for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn kind(&self) -> &str {
            "imagery_stats"
        }
        async fn fetch(
            &self,
            _fields: &[FieldRecord],
            _params: &SourceParams,
        ) -> Result<SourceBatch, SourceError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(SourceError::unavailable("slow", "never"))
        }
    }

    struct Panicky;

    #[async_trait]
    impl SourceAdapter for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn kind(&self) -> &str {
            "crops"
        }
        async fn fetch(
            &self,
            _fields: &[FieldRecord],
            _params: &SourceParams,
        ) -> Result<SourceBatch, SourceError> {
            panic!("adapter bug")
        }
    }

    fn fields(ids: &[&str]) -> FieldInput {
        let geometries = (0..ids.len())
            .map(|i| {
                let x = -93.6 + i as f64 * 0.02;
                MultiPolygon(vec![polygon![
                    (x: x, y: 41.5),
                    (x: x + 0.01, y: 41.5),
                    (x: x + 0.01, y: 41.51),
                    (x: x, y: 41.51),
                ]])
            })
            .collect();
        let frame = df!("field_id" => ids).unwrap();
        FieldInput::Frame(SpatialFrame::new(frame, geometries, Some(Crs::Wgs84)).unwrap())
    }

    fn source(adapter: impl SourceAdapter + 'static) -> ConfiguredSource {
        ConfiguredSource::builder().adapter(Arc::new(adapter)).build()
    }

    #[tokio::test]
    async fn unavailable_optional_source_still_finishes() {
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1", "F2", "F3"]))
            .sources(vec![
                source(MockSoilSource::builder().seed(4).build()),
                source(Unavailable),
            ])
            .build();

        let output = pipeline.run().await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(output.dataset.height(), 3);

        let weather = output.report.source("weather").unwrap();
        assert_eq!(weather.matched, 0);
        assert_eq!(weather.status, SourceStatus::Absent);
        assert!(weather.failure.as_deref().unwrap().contains("service down"));

        let temps = output.dataset.frame().column("weather_t2m").unwrap();
        assert!(temps
            .list()
            .unwrap()
            .into_iter()
            .all(|l| l.is_some_and(|s| s.is_empty())));
        assert_eq!(output.report.source("soil").unwrap().matched, 3);
    }

    #[tokio::test]
    async fn required_failure_fails_the_run() {
        let required = ConfiguredSource::builder()
            .adapter(Arc::new(Unavailable))
            .required(true)
            .build();
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1"]))
            .sources(vec![required])
            .build();

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(err, PipelineError::RequiredSourceFailed { .. }));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[tokio::test]
    async fn runs_once_until_reset() {
        let mut pipeline = Pipeline::builder().fields(fields(&["F1"])).build();
        pipeline.run().await.unwrap();
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::AlreadyRan(PipelineState::Done))
        ));
        pipeline.reset();
        assert!(pipeline.run().await.is_ok());
    }

    #[tokio::test]
    async fn concurrent_mode_isolates_timeouts_and_panics() {
        let soil = StaticSource::new(
            "soil",
            "soil",
            df!("field_id" => ["F2", "F1"], "om_pct" => [2.0, 1.0]).unwrap(),
        );
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1", "F2"]))
            .sources(vec![source(Slow), source(Panicky), source(soil)])
            .concurrent(true)
            .default_timeout(Duration::from_millis(50))
            .build();

        let output = pipeline.run().await.unwrap();
        let names: Vec<_> = output
            .report
            .sources
            .iter()
            .map(|s| s.source.as_str())
            .collect();
        assert_eq!(names, vec!["slow", "panicky", "soil"]);
        assert_eq!(output.report.sources[0].matched, 0);
        assert!(output.report.sources[1].failure.is_some());
        assert_eq!(output.report.sources[2].matched, 2);

        let om = output.dataset.frame().column("soil_om_pct").unwrap();
        assert_eq!(om.f64().unwrap().get(0), Some(1.0));
    }

    #[tokio::test]
    async fn renames_id_property_to_key() {
        let FieldInput::Frame(frame) = fields(&["F1", "F2"]) else {
            unreachable!()
        };
        let (mut df, geometries, crs) = frame.into_parts();
        df.rename("field_id", "parcel".into()).unwrap();
        let mut pipeline = Pipeline::builder()
            .fields(FieldInput::Frame(
                SpatialFrame::new(df, geometries, crs).unwrap(),
            ))
            .id_property("parcel")
            .build();

        let output = pipeline.run().await.unwrap();
        let ids = output.dataset.frame().column("field_id").unwrap();
        assert_eq!(ids.str().unwrap().get(1), Some("F2"));
    }

    #[tokio::test]
    async fn geojson_without_crs_member_runs_as_wgs84() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fields.geojson");
        std::fs::write(
            &path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"field_id": "F1"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-93.6, 41.5], [-93.59, 41.5], [-93.59, 41.51], [-93.6, 41.51], [-93.6, 41.5]]]}},
                {"type": "Feature", "properties": {"field_id": "F2"},
                 "geometry": {"type": "Polygon", "coordinates": [[[-93.58, 41.5], [-93.57, 41.5], [-93.57, 41.51], [-93.58, 41.51], [-93.58, 41.5]]]}}
            ]}"#,
        )
        .unwrap();

        let mut pipeline = Pipeline::builder()
            .fields(FieldInput::GeoJson(path))
            .sources(vec![source(MockSoilSource::builder().seed(3).build())])
            .build();

        let output = pipeline.run().await.unwrap();
        assert_eq!(output.dataset.frame().height(), 2);
        assert_eq!(output.dataset.crs(), Some(Crs::Wgs84));
    }

    #[tokio::test]
    async fn duplicate_field_ids_abort_before_sources() {
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1", "F1"]))
            .sources(vec![source(Unavailable)])
            .build();
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::Join(JoinError::DuplicateFieldId { .. }))
        ));
    }

    #[tokio::test]
    async fn bad_attribute_values_are_fatal() {
        let soil = StaticSource::new(
            "soil",
            "soil",
            df!("field_id" => ["F1"], "om_pct" => ["lots"]).unwrap(),
        );
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1"]))
            .sources(vec![source(soil)])
            .build();
        match pipeline.run().await.unwrap_err() {
            PipelineError::Standardize { table, .. } => assert_eq!(table, "soil"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_kind_fails_fast() {
        let odd = StaticSource::new("yield", "yield", df!("field_id" => ["F1"]).unwrap());
        let mut pipeline = Pipeline::builder()
            .fields(fields(&["F1"]))
            .sources(vec![source(odd)])
            .build();
        assert!(matches!(
            pipeline.run().await,
            Err(PipelineError::Schema(_))
        ));
    }
}
