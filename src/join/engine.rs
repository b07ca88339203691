use crate::join::dataset::{ColumnGroup, JoinedDataset};
use crate::join::error::JoinError;
use crate::join::report::{JoinReport, SourceReport};
use crate::schema::definition::Schema;
use crate::sources::adapter::SkippedRecord;
use crate::standardize::standardizer::fill_defaults;
use crate::types::spatial_frame::SpatialFrame;
use log::{debug, info};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};

/// A standardized attribute table and what is known about how it was
/// collected.
#[derive(Debug, Clone)]
pub struct AttributeSet {
    pub source: String,
    pub schema: Schema,
    pub frame: DataFrame,
    pub skipped: Vec<SkippedRecord>,
    pub failure: Option<String>,
}

impl AttributeSet {
    pub fn new(source: impl Into<String>, schema: Schema, frame: DataFrame) -> Self {
        Self {
            source: source.into(),
            schema,
            frame,
            skipped: Vec::new(),
            failure: None,
        }
    }

    /// Empty contribution of a source that could not be collected. Joins as
    /// defaults for every field.
    pub fn failed(
        source: impl Into<String>,
        schema: Schema,
        failure: impl Into<String>,
    ) -> PolarsResult<Self> {
        let frame = schema.empty_frame()?;
        Ok(Self {
            source: source.into(),
            schema,
            frame,
            skipped: Vec::new(),
            failure: Some(failure.into()),
        })
    }

    pub fn with_skipped(mut self, skipped: Vec<SkippedRecord>) -> Self {
        self.skipped = skipped;
        self
    }
}

/// Left joins every attribute set onto the `base` field table by key.
///
/// The output keeps every base row in base order and appends one
/// `<source>_<column>` column per non-key schema column of each set, in the
/// order the sets are given. Sets without a time column contribute the first
/// record per field; later ones are counted as dropped duplicates. Sets with a
/// time column contribute one list per field holding all its records, time
/// ordered. Fields a set does not cover receive that set's column defaults
/// (empty lists for time series).
///
/// Fails without a partial result on a duplicated base key or source name.
pub fn join(
    mut base: SpatialFrame,
    key_column: &str,
    sets: &[AttributeSet],
) -> Result<(JoinedDataset, JoinReport), JoinError> {
    let mut names = HashSet::new();
    for set in sets {
        if !names.insert(set.source.as_str()) {
            return Err(JoinError::DuplicateSourceName(set.source.clone()));
        }
    }

    let base_count = base.height();
    let index = index_base(base.frame(), key_column)?;
    let mut taken: HashSet<String> = base
        .frame()
        .get_column_names_str()
        .into_iter()
        .map(String::from)
        .collect();

    let mut appended = Vec::new();
    let mut groups = Vec::with_capacity(sets.len());
    let mut reports = Vec::with_capacity(sets.len());
    for set in sets {
        let contribution = join_one(set, &index, base_count)?;
        let mut group_columns = Vec::with_capacity(contribution.columns.len());
        for column in &contribution.columns {
            let name = column.name().to_string();
            if !taken.insert(name.clone()) {
                return Err(JoinError::ColumnNameCollision {
                    source_name: set.source.clone(),
                    column: name,
                });
            }
            group_columns.push(name);
        }
        info!(
            "Joined source '{}': {} of {} fields matched, {} orphans, {} duplicates dropped",
            set.source,
            contribution.report.matched,
            base_count,
            contribution.report.orphans,
            contribution.report.duplicates_dropped
        );
        groups.push(ColumnGroup {
            source: set.source.clone(),
            kind: set.schema.kind().to_string(),
            columns: group_columns,
            time_series: contribution.time_series,
        });
        appended.extend(contribution.columns);
        reports.push(contribution.report);
    }

    base.frame_mut().hstack_mut(&appended)?;
    let report = JoinReport {
        base_fields: base_count,
        sources: reports,
    };
    Ok((
        JoinedDataset::new(base, key_column.to_string(), groups),
        report,
    ))
}

fn index_base(frame: &DataFrame, key_column: &str) -> Result<HashMap<String, usize>, JoinError> {
    let keys = frame
        .column(key_column)
        .map_err(|_| JoinError::MissingKeyColumn {
            source_name: "base".to_string(),
            column: key_column.to_string(),
        })?
        .cast(&DataType::String)?;

    let mut index = HashMap::with_capacity(keys.len());
    for (row, key) in keys.str()?.into_iter().enumerate() {
        let key = key.ok_or(JoinError::MissingFieldId { row })?;
        if index.insert(key.to_string(), row).is_some() {
            return Err(JoinError::DuplicateFieldId {
                field_id: key.to_string(),
            });
        }
    }
    Ok(index)
}

struct Contribution {
    columns: Vec<Column>,
    report: SourceReport,
    time_series: bool,
}

fn join_one(
    set: &AttributeSet,
    index: &HashMap<String, usize>,
    base_count: usize,
) -> Result<Contribution, JoinError> {
    let key = set.schema.key_column();
    let time = set
        .schema
        .time_column()
        .filter(|t| set.frame.get_column_index(t).is_some());
    let frame = match time {
        Some(time) => set.frame.sort(
            [time],
            SortMultipleOptions::default()
                .with_maintain_order(true)
                .with_nulls_last(true),
        )?,
        None => set.frame.clone(),
    };

    let keys = frame
        .column(key)
        .map_err(|_| JoinError::MissingKeyColumn {
            source_name: set.source.clone(),
            column: key.to_string(),
        })?
        .cast(&DataType::String)?;
    let mut positions: Vec<Vec<IdxSize>> = vec![Vec::new(); base_count];
    let mut orphans = 0;
    for (row, key) in keys.str()?.into_iter().enumerate() {
        match key.and_then(|k| index.get(k)) {
            Some(&base_row) => positions[base_row].push(row as IdxSize),
            None => orphans += 1,
        }
    }
    if orphans > 0 {
        debug!("Source '{}' has {} orphan records", set.source, orphans);
    }
    let matched = positions.iter().filter(|p| !p.is_empty()).count();

    let (columns, duplicates_dropped) = if time.is_some() {
        (time_series_columns(set, &frame, &positions)?, 0)
    } else {
        first_record_columns(set, &frame, &positions)?
    };

    let report = SourceReport {
        source: set.source.clone(),
        kind: set.schema.kind().to_string(),
        status: SourceReport::status_for(
            matched,
            base_count,
            set.skipped.len(),
            set.failure.is_some(),
        ),
        records_received: frame.height(),
        matched,
        unmatched: base_count - matched,
        orphans,
        duplicates_dropped,
        skipped: set.skipped.clone(),
        failure: set.failure.clone(),
    };
    Ok(Contribution {
        columns,
        report,
        time_series: time.is_some(),
    })
}

fn prefixed(source: &str, column: &str) -> PlSmallStr {
    format!("{source}_{column}").into()
}

fn first_record_columns(
    set: &AttributeSet,
    frame: &DataFrame,
    positions: &[Vec<IdxSize>],
) -> Result<(Vec<Column>, usize), JoinError> {
    let first: IdxCa = positions.iter().map(|p| p.first().copied()).collect();
    let duplicates = positions.iter().map(|p| p.len().saturating_sub(1)).sum();

    let mut picked = Vec::new();
    for spec in set.schema.value_columns() {
        let values = frame.column(&spec.name)?.as_materialized_series();
        picked.push(values.take(&first)?.into_column());
    }
    if picked.is_empty() {
        return Ok((picked, duplicates));
    }
    let filled = fill_defaults(DataFrame::new(picked)?, &set.schema)?;
    let columns = filled
        .take_columns()
        .into_iter()
        .map(|c| {
            let name = prefixed(&set.source, c.name());
            c.with_name(name)
        })
        .collect();
    Ok((columns, duplicates))
}

fn time_series_columns(
    set: &AttributeSet,
    frame: &DataFrame,
    positions: &[Vec<IdxSize>],
) -> Result<Vec<Column>, JoinError> {
    let mut columns = Vec::new();
    for spec in set.schema.value_columns() {
        let values = frame.column(&spec.name)?.as_materialized_series();
        let per_field = positions
            .iter()
            .map(|p| values.take(&IdxCa::from_vec(PlSmallStr::EMPTY, p.clone())))
            .collect::<PolarsResult<Vec<Series>>>()?;
        let lists: ListChunked = per_field.into_iter().map(Some).collect();
        let list_type = DataType::List(Box::new(spec.column_type.data_type()));
        let series = lists
            .into_series()
            .cast(&list_type)?
            .with_name(prefixed(&set.source, &spec.name));
        columns.push(series.into_column());
    }
    Ok(columns)
}
