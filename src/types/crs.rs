//! Coordinate reference systems understood by the field pipeline, and the
//! closed-form transforms between them.

use geo::{Coord, MapCoords, MultiPolygon};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Radius of the sphere used by EPSG:3857, in meters.
const WEB_MERCATOR_RADIUS: f64 = 6_378_137.0;

/// A coordinate reference system, identified by its EPSG code.
///
/// Only [`Crs::Wgs84`] and [`Crs::WebMercator`] can be reprojected. Any other
/// code is carried through as [`Crs::Epsg`] so that it can be reported in
/// errors.
///
/// # Examples
///
/// ```
/// use fieldjoin::Crs;
///
/// let crs: Crs = "urn:ogc:def:crs:EPSG::3857".parse().unwrap();
/// assert_eq!(crs, Crs::WebMercator);
/// assert_eq!(Crs::Wgs84.to_string(), "EPSG:4326");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Geographic longitude/latitude on the WGS84 datum (EPSG:4326, OGC CRS84).
    Wgs84,
    /// Spherical web mercator in meters (EPSG:3857).
    WebMercator,
    /// Any other EPSG code.
    Epsg(u32),
}

impl Crs {
    pub fn epsg(&self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::Epsg(code) => *code,
        }
    }

    fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 900913 => Crs::WebMercator,
            other => Crs::Epsg(other),
        }
    }

    /// The OGC URN written into the legacy GeoJSON `crs` member.
    pub fn urn(&self) -> String {
        match self {
            Crs::Wgs84 => "urn:ogc:def:crs:OGC:1.3:CRS84".to_string(),
            other => format!("urn:ogc:def:crs:EPSG::{}", other.epsg()),
        }
    }

    /// Whether [`Crs::reproject`] knows a transform from `self` into `target`.
    pub fn can_reproject_to(&self, target: Crs) -> bool {
        *self == target
            || matches!(
                (*self, target),
                (Crs::WebMercator, Crs::Wgs84) | (Crs::Wgs84, Crs::WebMercator)
            )
    }

    /// Reprojects `geometry` from `self` into `target`.
    ///
    /// Returns `None` when no transform between the two systems is known.
    pub fn reproject(&self, geometry: &MultiPolygon<f64>, target: Crs) -> Option<MultiPolygon<f64>> {
        match (*self, target) {
            (from, to) if from == to => Some(geometry.clone()),
            (Crs::WebMercator, Crs::Wgs84) => Some(geometry.map_coords(mercator_to_lon_lat)),
            (Crs::Wgs84, Crs::WebMercator) => Some(geometry.map_coords(lon_lat_to_mercator)),
            _ => None,
        }
    }
}

fn mercator_to_lon_lat(coord: Coord<f64>) -> Coord<f64> {
    let lon = (coord.x / WEB_MERCATOR_RADIUS).to_degrees();
    let lat = (2.0 * (coord.y / WEB_MERCATOR_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    Coord { x: lon, y: lat }
}

fn lon_lat_to_mercator(coord: Coord<f64>) -> Coord<f64> {
    let x = WEB_MERCATOR_RADIUS * coord.x.to_radians();
    let y = WEB_MERCATOR_RADIUS * (PI / 4.0 + coord.y.to_radians() / 2.0).tan().ln();
    Coord { x, y }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Error returned when a CRS string cannot be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unrecognized coordinate reference '{0}'")]
pub struct ParseCrsError(pub String);

impl FromStr for Crs {
    type Err = ParseCrsError;

    /// Accepts `EPSG:4326`, `epsg:3857`, `urn:ogc:def:crs:EPSG::3857`,
    /// `urn:ogc:def:crs:OGC:1.3:CRS84` and `CRS84`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper == "CRS84" || upper.ends_with(":CRS84") {
            return Ok(Crs::Wgs84);
        }
        let code = upper
            .strip_prefix("EPSG:")
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG::"))
            .or_else(|| upper.strip_prefix("URN:OGC:DEF:CRS:EPSG:"))
            .and_then(|rest| rest.rsplit(':').next())
            .and_then(|code| code.parse::<u32>().ok())
            .ok_or_else(|| ParseCrsError(trimmed.to_string()))?;
        Ok(Crs::from_epsg(code))
    }
}

impl TryFrom<String> for Crs {
    type Error = ParseCrsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.to_string()
    }
}
