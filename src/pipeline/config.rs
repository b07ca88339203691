use crate::error::PipelineError;
use crate::io::sink::{GeoJsonSink, ParquetSink, Sink};
use crate::pipeline::orchestrator::{ConfiguredSource, FieldInput, Pipeline};
use crate::schema::definition::SchemaDefinition;
use crate::schema::registry::SchemaRegistry;
use crate::sources::adapter::SourceAdapter;
use crate::sources::csv_file::CsvFileSource;
use crate::sources::mock::{
    MockCropSource, MockImageryStatsSource, MockSoilSource, MockWeatherSource,
};
use crate::sources::params::SourceParams;
use crate::types::crs::Crs;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CONFIG: &str = include_str!("default.toml");
const ENV_PREFIX: &str = "FIELDJOIN__";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub fields: FieldsConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    /// Extra or replacement schemas, merged over the built-in ones.
    #[serde(default)]
    pub schemas: Vec<SchemaDefinition>,
    pub output: Option<OutputConfig>,
    #[serde(default)]
    pub concurrent: bool,
    pub default_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldsConfig {
    /// GeoJSON FeatureCollection of field boundaries.
    pub path: Option<PathBuf>,
    /// Feature property holding the field id; `field_id` when absent.
    pub id_property: Option<String>,
    pub assume_crs: Option<Crs>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(flatten)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub required: bool,
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub params: SourceParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "adapter", rename_all = "snake_case")]
pub enum AdapterConfig {
    Csv {
        kind: String,
        path: PathBuf,
        separator: Option<char>,
    },
    MockSoil {
        seed: Option<u64>,
    },
    MockCrops {
        seed: Option<u64>,
    },
    MockWeather {
        seed: Option<u64>,
    },
    MockImagery {
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Geojson,
    Parquet,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Taken from the file extension when absent.
    pub format: Option<OutputFormat>,
}

impl OutputConfig {
    pub fn format(&self) -> OutputFormat {
        self.format.unwrap_or_else(|| {
            match self.path.extension().and_then(|e| e.to_str()) {
                Some(ext) if ext.eq_ignore_ascii_case("parquet") => OutputFormat::Parquet,
                _ => OutputFormat::Geojson,
            }
        })
    }

    pub fn sink(&self) -> Arc<dyn Sink> {
        match self.format() {
            OutputFormat::Geojson => Arc::new(GeoJsonSink::new(&self.path)),
            OutputFormat::Parquet => Arc::new(ParquetSink::new(&self.path)),
        }
    }
}

impl PipelineConfig {
    /// Built-in defaults overridden by `FIELDJOIN__*` environment variables.
    pub fn load() -> Result<Self, PipelineError> {
        extract(Figment::from(Toml::string(DEFAULT_CONFIG)), ENV_PREFIX)
    }

    /// Built-in defaults, then `path`, then the environment.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let figment = Figment::from(Toml::string(DEFAULT_CONFIG)).admerge(Toml::file(path));
        extract(figment, ENV_PREFIX)
    }

    /// Built-in defaults overridden by inline TOML, ignoring the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self, PipelineError> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Toml::string(toml))
            .extract()
            .map_err(|e| PipelineError::Config(Box::new(e)))
    }

    pub fn registry(&self) -> Result<SchemaRegistry, PipelineError> {
        Ok(SchemaRegistry::builtin().with_definitions(self.schemas.clone())?)
    }

    pub fn pipeline(&self) -> Result<Pipeline, PipelineError> {
        let fields = self.fields.path.clone().ok_or_else(|| {
            PipelineError::Config(Box::new(figment::Error::from(
                "missing `fields.path`".to_string(),
            )))
        })?;
        let registry = self.registry()?;
        let sources = self
            .sources
            .iter()
            .map(SourceConfig::configured)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pipeline::builder()
            .fields(FieldInput::GeoJson(fields))
            .maybe_id_property(self.fields.id_property.clone())
            .registry(Arc::new(registry))
            .sources(sources)
            .maybe_sink(self.output.as_ref().map(OutputConfig::sink))
            .concurrent(self.concurrent)
            .maybe_assume_crs(self.fields.assume_crs)
            .maybe_default_timeout(self.default_timeout_secs.map(Duration::from_secs))
            .build())
    }
}

impl SourceConfig {
    pub fn adapter(&self) -> Result<Arc<dyn SourceAdapter>, PipelineError> {
        let name = self.name.clone();
        Ok(match &self.adapter {
            AdapterConfig::Csv {
                kind,
                path,
                separator,
            } => {
                let separator = match separator {
                    Some(c) => u8::try_from(*c).map_err(|_| {
                        PipelineError::Config(Box::new(figment::Error::from(format!(
                            "separator '{c}' of source '{name}' is not a single byte"
                        ))))
                    })?,
                    None => b',',
                };
                Arc::new(
                    CsvFileSource::builder()
                        .name(name)
                        .kind(kind.as_str())
                        .path(path.as_path())
                        .separator(separator)
                        .build(),
                )
            }
            AdapterConfig::MockSoil { seed } => Arc::new(
                MockSoilSource::builder()
                    .name(name)
                    .maybe_seed(*seed)
                    .build(),
            ),
            AdapterConfig::MockCrops { seed } => Arc::new(
                MockCropSource::builder()
                    .name(name)
                    .maybe_seed(*seed)
                    .build(),
            ),
            AdapterConfig::MockWeather { seed } => Arc::new(
                MockWeatherSource::builder()
                    .name(name)
                    .maybe_seed(*seed)
                    .build(),
            ),
            AdapterConfig::MockImagery { seed } => Arc::new(
                MockImageryStatsSource::builder()
                    .name(name)
                    .maybe_seed(*seed)
                    .build(),
            ),
        })
    }

    pub fn configured(&self) -> Result<ConfiguredSource, PipelineError> {
        Ok(ConfiguredSource::builder()
            .adapter(self.adapter()?)
            .params(self.params.clone())
            .required(self.required)
            .maybe_timeout(self.timeout_secs.map(Duration::from_secs))
            .build())
    }
}

fn extract(figment: Figment, prefix: &str) -> Result<PipelineConfig, PipelineError> {
    figment
        .admerge(Env::prefixed(prefix).map(|p| p.as_str().replace("__", ".").into()))
        .extract()
        .map_err(|e| PipelineError::Config(Box::new(e)))
}
