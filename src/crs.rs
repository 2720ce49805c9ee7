use crate::error::PipelineError;
use geo::Coord;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// WGS84 semi-major axis used by spherical Web Mercator.
static EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Coordinate reference systems a polygon table may be delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, x = longitude, y = latitude in degrees.
    Wgs84,
    /// EPSG:3857, metres.
    WebMercator,
}

impl FromStr for Crs {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EPSG:4326" | "WGS84" | "4326" => Ok(Crs::Wgs84),
            "EPSG:3857" | "EPSG:900913" | "3857" => Ok(Crs::WebMercator),
            _ => Err(PipelineError::UnsupportedCrs(s.to_string())),
        }
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "EPSG:4326"),
            Crs::WebMercator => write!(f, "EPSG:3857"),
        }
    }
}

impl Crs {
    /// Project a coordinate of this CRS to longitude/latitude degrees.
    pub fn to_lon_lat(self, c: Coord<f64>) -> Coord<f64> {
        match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => Coord {
                x: (c.x / EARTH_RADIUS_M).to_degrees(),
                y: (2.0 * (c.y / EARTH_RADIUS_M).exp().atan() - PI / 2.0).to_degrees(),
            },
        }
    }
}

pub fn is_lon_lat(c: Coord<f64>) -> bool {
    c.x.is_finite()
        && c.y.is_finite()
        && (-180.0..=180.0).contains(&c.x)
        && (-90.0..=90.0).contains(&c.y)
}
