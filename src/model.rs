use geo::MultiPolygon;

/// Sentinel written in place of a port name when there is none to report.
pub const NO_PORT: &str = "No";

/// One cleaned AIS position. `fields` keeps every raw column verbatim, in
/// the order of the table header, so it can be written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub fields: Vec<String>,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
}

#[derive(Debug, Clone)]
pub struct PositionTable {
    pub headers: Vec<String>,
    pub records: Vec<PositionRecord>,
}

impl PositionTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// Main Port Name,Latitude,Longitude
// Port of Rotterdam,51.9500,4.1333
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Port {
    #[serde(rename = "Main Port Name")]
    pub name: String,
    #[serde(rename = "Latitude")]
    pub lat: f64,
    #[serde(rename = "Longitude")]
    pub lon: f64,
}

impl Port {
    pub fn as_row(&self) -> Vec<String> {
        vec![self.name.clone(), self.lat.to_string(), self.lon.to_string()]
    }
}

// port_name,polygon
// Aarhus,"POLYGON ((10.21 56.14, 10.26 56.14, 10.26 56.17, 10.21 56.17, 10.21 56.14))"
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Deserialize)]
pub struct PolygonRow {
    pub port_name: String,
    pub polygon: String,
}

/// A port boundary, always in longitude/latitude degrees.
#[derive(Debug, Clone)]
pub struct PortPolygon {
    pub name: String,
    pub boundary: MultiPolygon<f64>,
}

/// Result of the nearest-port stage for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Proximity {
    pub distance: f64,
    pub port_name: String,
    pub port_lat: Option<f64>,
    pub port_lon: Option<f64>,
    /// One entry per configured threshold, same order.
    pub within: Vec<bool>,
}

impl Proximity {
    pub fn is_near_any_port(&self) -> bool {
        self.within.iter().any(|w| *w)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProximityRecord {
    pub position: PositionRecord,
    pub proximity: Proximity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Containment {
    pub parked: bool,
    pub port_name: String,
}

impl Containment {
    pub fn outside() -> Self {
        Containment {
            parked: false,
            port_name: NO_PORT.to_string(),
        }
    }
}
