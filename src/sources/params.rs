use crate::sources::error::SourceError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// String key/value parameters handed to every [`fetch`] call, with typed
/// accessors for the keys adapters commonly understand.
///
/// [`fetch`]: crate::SourceAdapter::fetch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, ParamValue>", into = "BTreeMap<String, String>")]
pub struct SourceParams(BTreeMap<String, String>);

/// Configuration files may write numbers and booleans unquoted.
#[derive(Deserialize)]
#[serde(untagged)]
enum ParamValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl From<BTreeMap<String, ParamValue>> for SourceParams {
    fn from(map: BTreeMap<String, ParamValue>) -> Self {
        map.into_iter()
            .map(|(key, value)| {
                let value = match value {
                    ParamValue::Text(v) => v,
                    ParamValue::Int(v) => v.to_string(),
                    ParamValue::Float(v) => v.to_string(),
                    ParamValue::Bool(v) => v.to_string(),
                };
                (key, value)
            })
            .collect()
    }
}

impl From<SourceParams> for BTreeMap<String, String> {
    fn from(params: SourceParams) -> Self {
        params.0
    }
}

impl SourceParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A `YYYY-MM-DD` date.
    pub fn date(&self, key: &str) -> Result<Option<NaiveDate>, SourceError> {
        self.parsed(key, |v| {
            NaiveDate::parse_from_str(v, "%Y-%m-%d").map_err(|e| e.to_string())
        })
    }

    pub fn start_date(&self) -> Result<Option<NaiveDate>, SourceError> {
        self.date("start_date")
    }

    pub fn end_date(&self) -> Result<Option<NaiveDate>, SourceError> {
        self.date("end_date")
    }

    pub fn u64(&self, key: &str) -> Result<Option<u64>, SourceError> {
        self.parsed(key, |v| v.parse::<u64>().map_err(|e| e.to_string()))
    }

    pub fn f64(&self, key: &str) -> Result<Option<f64>, SourceError> {
        self.parsed(key, |v| v.parse::<f64>().map_err(|e| e.to_string()))
    }

    /// Seed for the placeholder generators.
    pub fn seed(&self) -> Result<Option<u64>, SourceError> {
        self.u64("seed")
    }

    /// Years as a comma separated list (`2021,2023`), an inclusive range
    /// (`2019-2023`) or a mix of both. Sorted and de-duplicated.
    pub fn years(&self) -> Result<Option<Vec<i32>>, SourceError> {
        self.parsed("years", parse_years)
    }

    fn parsed<T>(
        &self,
        key: &str,
        parse: impl Fn(&str) -> Result<T, String>,
    ) -> Result<Option<T>, SourceError> {
        let Some(value) = self.get(key) else {
            return Ok(None);
        };
        parse(value.trim())
            .map(Some)
            .map_err(|reason| SourceError::InvalidParameter {
                key: key.to_string(),
                value: value.to_string(),
                reason,
            })
    }
}

impl<K: Into<String>, V: ToString> FromIterator<(K, V)> for SourceParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.to_string()))
                .collect(),
        )
    }
}

fn parse_years(value: &str) -> Result<Vec<i32>, String> {
    let mut years = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((from, to)) => {
                let from = parse_year(from)?;
                let to = parse_year(to)?;
                if from > to {
                    return Err(format!("range {from}-{to} is reversed"));
                }
                years.extend(from..=to);
            }
            None => years.push(parse_year(part)?),
        }
    }
    if years.is_empty() {
        return Err("no years given".to_string());
    }
    years.sort_unstable();
    years.dedup();
    Ok(years)
}

fn parse_year(text: &str) -> Result<i32, String> {
    text.trim()
        .parse::<i32>()
        .map_err(|_| format!("'{}' is not a year", text.trim()))
}
