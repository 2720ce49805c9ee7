use crate::columnar;
use crate::error::PipelineError;
use crate::model::{Port, PolygonRow, PositionRecord, PositionTable};
use anyhow::{Context, Result};
use log::{info, warn};
use std::collections::HashSet;
use std::path::Path;

static MIN_LAT: f64 = -90.0;
static MAX_LAT: f64 = 90.0;
static MIN_LON: f64 = -180.0;
static MAX_LON: f64 = 180.0;

static NULL_MARKERS: [&str; 4] = ["nan", "na", "null", "none"];

/// Which columns hold the position and what speeds are plausible.
#[derive(Debug, Clone)]
pub struct CleaningRules {
    pub lat_column: String,
    pub lon_column: String,
    pub speed_column: String,
    pub min_speed: f64,
    pub max_speed: f64,
}

impl Default for CleaningRules {
    fn default() -> Self {
        CleaningRules {
            lat_column: "latitude".to_string(),
            lon_column: "longitude".to_string(),
            speed_column: "speed".to_string(),
            min_speed: 0.0,
            // 102.3 knots is the AIS "not available" marker.
            max_speed: 102.2,
        }
    }
}

/// Position table as read from disk, nothing parsed or filtered yet.
#[derive(Debug)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    lat_idx: usize,
    lon_idx: usize,
    speed_idx: usize,
}

impl RawTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>, rules: &CleaningRules) -> Result<Self> {
        Self::with_source(headers, rows, rules, "<memory>")
    }

    fn with_source(
        headers: Vec<String>,
        rows: Vec<Vec<String>>,
        rules: &CleaningRules,
        source: &str,
    ) -> Result<Self> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| PipelineError::MissingColumn {
                    path: source.to_string(),
                    column: column.to_string(),
                })
        };
        let lat_idx = find(&rules.lat_column)?;
        let lon_idx = find(&rules.lon_column)?;
        let speed_idx = find(&rules.speed_column)?;

        Ok(RawTable {
            headers,
            rows,
            lat_idx,
            lon_idx,
            speed_idx,
        })
    }
}

pub fn is_null(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || NULL_MARKERS.iter().any(|m| value.eq_ignore_ascii_case(m))
}

/// Read the raw position table. Files ending in `.parquet` go through the
/// columnar reader, anything else is read as CSV with a header row.
pub fn load_positions(path: &Path, rules: &CleaningRules) -> Result<RawTable> {
    let source = path.display().to_string();
    let is_parquet = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("parquet"));

    let table = if is_parquet {
        // resolve columns before decoding any row group.
        let (headers, rows) = columnar::read_parquet(path, |headers| {
            RawTable::with_source(headers.to_vec(), Vec::new(), rules, &source).map(|_| ())
        })?;
        RawTable::with_source(headers, rows, rules, &source)?
    } else {
        load_csv_positions(path, rules)?
    };

    info!("{} has {} raw records.", source, table.rows.len());
    Ok(table)
}

fn load_csv_positions(path: &Path, rules: &CleaningRules) -> Result<RawTable> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open position file {}", path.display()))?;

    let headers = rdr
        .headers()
        .with_context(|| format!("failed to read header of {}", path.display()))?
        .iter()
        .map(str::to_string)
        .collect::<Vec<String>>();

    // resolve columns before touching any row.
    let source = path.display().to_string();
    let mut table = RawTable::with_source(headers, Vec::new(), rules, &source)?;

    for result in rdr.records() {
        let record = result.with_context(|| format!("failed to read row of {}", source))?;
        table.rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(table)
}

/// Null removal, coordinate check, speed check and de-duplication, in that
/// order. Rows failing a step are dropped silently.
pub fn clean(raw: RawTable, rules: &CleaningRules) -> PositionTable {
    let RawTable {
        headers,
        rows,
        lat_idx,
        lon_idx,
        speed_idx,
    } = raw;
    let total = rows.len();

    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .filter(|row| !row.iter().any(|f| is_null(f)))
        .collect();
    let after_nulls = rows.len();

    let located: Vec<PositionRecord> = rows
        .into_iter()
        .filter_map(|fields| {
            let lat = parse_finite(fields.get(lat_idx)?)?;
            let lon = parse_finite(fields.get(lon_idx)?)?;
            if !valid_coordinates(lat, lon) {
                return None;
            }
            // speed is parsed later, NaN marks "not checked yet".
            Some(PositionRecord {
                fields,
                lat,
                lon,
                speed: f64::NAN,
            })
        })
        .collect();
    let after_coords = located.len();

    let moving: Vec<PositionRecord> = located
        .into_iter()
        .filter_map(|mut record| {
            let speed = parse_finite(record.fields.get(speed_idx)?)?;
            if speed < rules.min_speed || speed > rules.max_speed {
                return None;
            }
            record.speed = speed;
            Some(record)
        })
        .collect();
    let after_speed = moving.len();

    // lat/lon/speed compare by value, so "40" and "40.0" are the same row.
    let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(moving.len());
    let records: Vec<PositionRecord> = moving
        .into_iter()
        .filter(|record| {
            let mut key = record.fields.clone();
            key[lat_idx] = value_key(record.lat);
            key[lon_idx] = value_key(record.lon);
            key[speed_idx] = value_key(record.speed);
            seen.insert(key)
        })
        .collect();

    info!(
        "cleaning: {} rows in, {} dropped for nulls, {} for coordinates, {} for speed, {} duplicates, {} kept.",
        total,
        total - after_nulls,
        after_nulls - after_coords,
        after_coords - after_speed,
        after_speed - records.len(),
        records.len()
    );

    PositionTable { headers, records }
}

// -0.0 folds onto 0.0 before taking the bit pattern.
fn value_key(v: f64) -> String {
    (v + 0.0).to_bits().to_string()
}

fn parse_finite(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn valid_coordinates(lat: f64, lon: f64) -> bool {
    (MIN_LAT..=MAX_LAT).contains(&lat) && (MIN_LON..=MAX_LON).contains(&lon)
}

pub fn load_ports(path: &Path) -> Result<Vec<Port>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open port file {}", path.display()))?;

    let mut ports: Vec<Port> = Vec::new();
    for result in rdr.deserialize() {
        let port: Port =
            result.with_context(|| format!("invalid port row in {}", path.display()))?;
        if !valid_coordinates(port.lat, port.lon) {
            warn!(
                "skipping port `{}` in {}: ({}, {}) is not a valid latitude/longitude.",
                port.name,
                path.display(),
                port.lat,
                port.lon
            );
            continue;
        }
        if !ports.contains(&port) {
            ports.push(port);
        }
    }

    if ports.is_empty() {
        return Err(PipelineError::NoPorts(path.display().to_string()).into());
    }
    info!("{} has {} distinct ports.", path.display(), ports.len());
    Ok(ports)
}

/// Raw polygon rows with exact duplicates removed; geometry is parsed by
/// `containment::PortPolygons`.
pub fn load_polygon_rows(path: &Path) -> Result<Vec<PolygonRow>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to open polygon file {}", path.display()))?;

    let mut seen: HashSet<PolygonRow> = HashSet::new();
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: PolygonRow =
            result.with_context(|| format!("invalid polygon row in {}", path.display()))?;
        if seen.insert(row.clone()) {
            rows.push(row);
        }
    }
    Ok(rows)
}
