use crate::schema::column::{parse_date_days, ColumnSpec, ColumnType};
use crate::schema::definition::Schema;
use crate::standardize::error::StandardizeError;
use crate::types::crs::Crs;
use crate::types::spatial_frame::SpatialFrame;
use log::{debug, info};
use polars::prelude::*;

/// Conforms `raw` to `schema`.
///
/// The result has exactly the schema's columns, in schema order. Columns the
/// raw table lacks are created empty, every column is coerced to its declared
/// type and nulls are replaced with the column default where one is declared.
/// Extra raw columns are dropped. Text values are trimmed and blank text counts
/// as missing.
///
/// A value that cannot be coerced fails the whole call with
/// [`StandardizeError::TypeCoercion`], naming the first offending row. Rows are
/// never dropped or reordered.
///
/// Applying `standardize` to its own output returns an equal table.
pub fn standardize(raw: &DataFrame, schema: &Schema) -> Result<DataFrame, StandardizeError> {
    let key = schema.key_column();
    if raw.get_column_index(key).is_none() {
        return Err(StandardizeError::MissingKeyColumn {
            kind: schema.kind().to_string(),
            column: key.to_string(),
        });
    }

    let height = raw.height();
    let mut columns = Vec::with_capacity(schema.columns().len());
    for spec in schema.columns() {
        let series = match raw.column(&spec.name) {
            Ok(column) => coerce(column.as_materialized_series(), spec)?,
            Err(_) => {
                debug!(
                    "Column '{}' missing from '{}' table, creating it",
                    spec.name,
                    schema.kind()
                );
                Series::full_null(
                    spec.name.as_str().into(),
                    height,
                    &spec.column_type.data_type(),
                )
            }
        };
        columns.push(series.into_column());
    }

    let frame = DataFrame::new(columns)?;
    Ok(fill_defaults(frame, schema)?)
}

/// Standardizes the attribute table, then reprojects the geometries to the
/// schema's canonical reference.
///
/// The source reference is the frame's own, else `assume_crs`. Schemas without
/// a canonical reference leave geometries untouched.
pub fn standardize_spatial(
    raw: SpatialFrame,
    schema: &Schema,
    assume_crs: Option<Crs>,
) -> Result<SpatialFrame, StandardizeError> {
    let frame = standardize(raw.frame(), schema)?;
    let Some(target) = schema.crs() else {
        return Ok(raw.with_frame(frame)?);
    };
    let (_, geometries, crs) = raw.into_parts();

    let source = crs
        .or(assume_crs)
        .ok_or_else(|| StandardizeError::MissingCoordinateReference {
            kind: schema.kind().to_string(),
        })?;
    if !source.can_reproject_to(target) {
        return Err(StandardizeError::UnsupportedReprojection {
            from: source,
            to: target,
        });
    }

    let geometries = if source == target {
        geometries
    } else {
        info!(
            "Reprojecting {} '{}' geometries from {source} to {target}",
            geometries.len(),
            schema.kind()
        );
        geometries
            .iter()
            .map(|g| {
                source
                    .reproject(g, target)
                    .ok_or(StandardizeError::UnsupportedReprojection {
                        from: source,
                        to: target,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(SpatialFrame::new(frame, geometries, Some(target))?)
}

/// Replaces nulls with each column's declared default. Columns without a
/// default keep their nulls.
pub fn fill_defaults(frame: DataFrame, schema: &Schema) -> PolarsResult<DataFrame> {
    let fills: Vec<Expr> = schema
        .columns()
        .iter()
        .filter(|c| frame.get_column_index(&c.name).is_some())
        .filter_map(|c| {
            c.default
                .as_ref()
                .map(|d| col(c.name.as_str()).fill_null(d.literal(c.column_type)))
        })
        .collect();
    if fills.is_empty() {
        return Ok(frame);
    }
    frame.lazy().with_columns(fills).collect()
}

fn coerce(series: &Series, spec: &ColumnSpec) -> Result<Series, StandardizeError> {
    let target = spec.column_type.data_type();
    let coerced = match series.dtype() {
        DataType::String => parse_text(series.str()?, spec)?,
        DataType::Null => Series::full_null(spec.name.as_str().into(), series.len(), &target),
        dtype if *dtype == target => series.clone(),
        _ => cast_checked(series, spec)?,
    };
    Ok(coerced.with_name(spec.name.as_str().into()))
}

fn parse_text(values: &StringChunked, spec: &ColumnSpec) -> Result<Series, StandardizeError> {
    let name: PlSmallStr = spec.name.as_str().into();
    let series = match spec.column_type {
        ColumnType::Text => {
            let trimmed: StringChunked = values
                .into_iter()
                .map(|v| v.map(str::trim).filter(|v| !v.is_empty()))
                .collect();
            trimmed.with_name(name).into_series()
        }
        ColumnType::Int64 => Series::new(name, parse_each(values, spec, parse_int)?),
        ColumnType::Float64 => {
            let parsed = parse_each(values, spec, |t| t.parse::<f64>().ok())?;
            let parsed: Vec<Option<f64>> = parsed
                .into_iter()
                .map(|v| v.filter(|f| !f.is_nan()))
                .collect();
            Series::new(name, parsed)
        }
        ColumnType::Date => {
            Series::new(name, parse_each(values, spec, parse_date_days)?).cast(&DataType::Date)?
        }
    };
    Ok(series)
}

/// Integers may be written with a zero fraction, as in `2021.0`.
fn parse_int(text: &str) -> Option<i64> {
    text.parse::<i64>()
        .ok()
        .or_else(|| text.parse::<f64>().ok().and_then(exact_int))
}

/// The integer `f` holds exactly, if it is whole and inside the `i64` range.
fn exact_int(f: f64) -> Option<i64> {
    // i64::MAX rounds up to 2^63 as f64, which is already out of range.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (in_range && f.fract() == 0.0).then_some(f as i64)
}

fn parse_each<T>(
    values: &StringChunked,
    spec: &ColumnSpec,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Vec<Option<T>>, StandardizeError> {
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => parse(text)
                .map(Some)
                .ok_or_else(|| coercion_error(spec, text.to_string(), row)),
        })
        .collect()
}

fn cast_checked(series: &Series, spec: &ColumnSpec) -> Result<Series, StandardizeError> {
    if spec.column_type == ColumnType::Int64 && series.dtype().is_float() {
        let floats = series.cast(&DataType::Float64)?;
        let lossy = floats
            .f64()?
            .into_iter()
            .enumerate()
            .find_map(|(row, v)| v.filter(|f| exact_int(*f).is_none()).map(|f| (row, f)));
        if let Some((row, value)) = lossy {
            return Err(coercion_error(spec, value.to_string(), row));
        }
    }

    let cast = series.cast(&spec.column_type.data_type())?;
    let introduced = &series.is_not_null() & &cast.is_null();
    if let Some(row) = (&introduced).into_iter().position(|v| v == Some(true)) {
        return Err(coercion_error(spec, display_value(&series.get(row)?), row));
    }
    Ok(cast)
}

fn coercion_error(spec: &ColumnSpec, value: String, row: usize) -> StandardizeError {
    StandardizeError::TypeCoercion {
        column: spec.name.clone(),
        value,
        row,
        expected: spec.column_type,
    }
}

fn display_value(value: &AnyValue) -> String {
    match value {
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::DefaultValue;
    use crate::schema::registry::SchemaRegistry;
    use geo::{polygon, MultiPolygon};

    fn soil() -> Schema {
        SchemaRegistry::builtin().get("soil").unwrap().clone()
    }

    #[test]
    fn selects_orders_and_fills() {
        let raw = df!(
            "ph_water" => ["6.5", "7.1"],
            "extra" => [1, 2],
            "field_id" => [" F1", "F2"],
            "dominant_soil" => [Some("Loam"), None],
        )
        .unwrap();

        let out = standardize(&raw, &soil()).unwrap();
        assert_eq!(
            out.get_column_names_str(),
            vec!["field_id", "dominant_soil", "om_pct", "ph_water", "awc_r", "drainagecl"]
        );
        let ids = out.column("field_id").unwrap().str().unwrap();
        assert_eq!(ids.get(0), Some("F1"));
        let soil_type = out.column("dominant_soil").unwrap().str().unwrap();
        assert_eq!(soil_type.get(1), Some("Unknown"));
        assert_eq!(out.column("om_pct").unwrap().dtype(), &DataType::Float64);
        assert_eq!(out.column("om_pct").unwrap().null_count(), 2);
        assert_eq!(out.column("drainagecl").unwrap().str().unwrap().get(0), Some("Unknown"));
        assert_eq!(out.column("ph_water").unwrap().f64().unwrap().get(1), Some(7.1));
    }

    #[test]
    fn reports_first_bad_value() {
        let raw = df!(
            "field_id" => ["F1", "F2", "F3"],
            "om_pct" => ["3.1", "n/a", "oops"],
        )
        .unwrap();
        match standardize(&raw, &soil()).unwrap_err() {
            StandardizeError::TypeCoercion {
                column, value, row, ..
            } => {
                assert_eq!(column, "om_pct");
                assert_eq!(value, "n/a");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn lossy_float_to_int_is_rejected() {
        let crops = SchemaRegistry::builtin().get("crops").unwrap().clone();
        let raw = df!(
            "field_id" => ["F1", "F1"],
            "year" => [2021.0, 2022.5],
        )
        .unwrap();
        assert!(matches!(
            standardize(&raw, &crops),
            Err(StandardizeError::TypeCoercion { row: 1, .. })
        ));
    }

    #[test]
    fn out_of_range_int_text_is_rejected() {
        let crops = SchemaRegistry::builtin().get("crops").unwrap().clone();
        let raw = df!(
            "field_id" => ["F1", "F1"],
            "year" => ["2021", "1e20"],
        )
        .unwrap();
        match standardize(&raw, &crops).unwrap_err() {
            StandardizeError::TypeCoercion { column, value, row, .. } => {
                assert_eq!(column, "year");
                assert_eq!(value, "1e20");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn out_of_range_int_float_is_rejected() {
        let crops = SchemaRegistry::builtin().get("crops").unwrap().clone();
        let raw = df!(
            "field_id" => ["F1", "F1"],
            "year" => [2021.0, 1e20],
        )
        .unwrap();
        assert!(matches!(
            standardize(&raw, &crops),
            Err(StandardizeError::TypeCoercion { row: 1, .. })
        ));
    }

    #[test]
    fn missing_key_column() {
        let raw = df!("om_pct" => [1.0]).unwrap();
        assert!(matches!(
            standardize(&raw, &soil()),
            Err(StandardizeError::MissingKeyColumn { .. })
        ));
    }

    #[test]
    fn is_idempotent() {
        let weather = SchemaRegistry::builtin().get("weather").unwrap().clone();
        let raw = df!(
            "field_id" => ["F1", "F1", "F2"],
            "date" => ["2024-05-01", "2024-05-02", "2024-05-01"],
            "t2m" => [Some("14.2"), None, Some("12.0")],
            "prectotcorr" => [None, Some("3.5"), None],
        )
        .unwrap();
        let once = standardize(&raw, &weather).unwrap();
        let twice = standardize(&once, &weather).unwrap();
        assert!(once.equals_missing(&twice));
        assert_eq!(once.column("date").unwrap().dtype(), &DataType::Date);
        assert_eq!(
            once.column("prectotcorr").unwrap().f64().unwrap().get(0),
            Some(0.0)
        );
    }

    #[test]
    fn numeric_key_becomes_text() {
        let raw = df!("field_id" => [101i64, 102]).unwrap();
        let out = standardize(&raw, &soil()).unwrap();
        assert_eq!(out.column("field_id").unwrap().str().unwrap().get(1), Some("102"));
    }

    #[test]
    fn date_default_is_applied() {
        let schema = Schema::new(
            "visits",
            vec![
                ColumnSpec::key("field_id"),
                ColumnSpec::value("visited", ColumnType::Date)
                    .with_default(DefaultValue::Text("2024-01-01".into())),
            ],
            None,
        )
        .unwrap();
        let raw = df!("field_id" => ["F1"]).unwrap();
        let out = standardize(&raw, &schema).unwrap();
        let visited = out.column("visited").unwrap();
        assert_eq!(visited.null_count(), 0);
        assert_eq!(visited.dtype(), &DataType::Date);
    }

    fn mercator_square() -> MultiPolygon<f64> {
        // -93.6, 41.5 .. -93.59, 41.51 in EPSG:3857
        MultiPolygon(vec![polygon![
            (x: -10_419_504.338, y: 5_086_373.649),
            (x: -10_418_391.143, y: 5_086_373.649),
            (x: -10_418_391.143, y: 5_087_860.093),
            (x: -10_419_504.338, y: 5_087_860.093),
        ]])
    }

    #[test]
    fn spatial_reprojects_from_mercator() {
        let fields = SchemaRegistry::builtin().get("fields").unwrap().clone();
        let raw = SpatialFrame::new(
            df!("field_id" => ["F1"]).unwrap(),
            vec![mercator_square()],
            Some(Crs::WebMercator),
        )
        .unwrap();
        let out = standardize_spatial(raw, &fields, None).unwrap();
        assert_eq!(out.crs(), Some(Crs::Wgs84));

        let expected = Crs::WebMercator
            .reproject(&mercator_square(), Crs::Wgs84)
            .unwrap();
        let first = out.geometries()[0].0[0].exterior().0[0];
        let want = expected.0[0].exterior().0[0];
        assert!((first.x - want.x).abs() < 1e-6);
        assert!((first.y - want.y).abs() < 1e-6);
        assert!((first.x - -93.6).abs() < 1e-3, "{}", first.x);
    }

    #[test]
    fn spatial_reference_resolution() {
        let fields = SchemaRegistry::builtin().get("fields").unwrap().clone();
        let raw = || {
            SpatialFrame::new(df!("field_id" => ["F1"]).unwrap(), vec![mercator_square()], None)
                .unwrap()
        };
        assert!(matches!(
            standardize_spatial(raw(), &fields, None),
            Err(StandardizeError::MissingCoordinateReference { .. })
        ));
        let assumed = standardize_spatial(raw(), &fields, Some(Crs::WebMercator)).unwrap();
        assert_eq!(assumed.crs(), Some(Crs::Wgs84));
        assert!(matches!(
            standardize_spatial(raw(), &fields, Some(Crs::Epsg(5070))),
            Err(StandardizeError::UnsupportedReprojection { .. })
        ));
    }

    #[test]
    fn spatial_without_canonical_reference_keeps_geometries() {
        assert_eq!(soil().crs(), None);
        let raw = SpatialFrame::new(
            df!("field_id" => ["F1"], "om_pct" => ["2.5"]).unwrap(),
            vec![mercator_square()],
            Some(Crs::WebMercator),
        )
        .unwrap();
        let out = standardize_spatial(raw, &soil(), None).unwrap();
        assert_eq!(out.crs(), Some(Crs::WebMercator));
        assert_eq!(out.geometries(), &[mercator_square()][..]);
        assert_eq!(out.frame().column("om_pct").unwrap().f64().unwrap().get(0), Some(2.5));
    }
}
