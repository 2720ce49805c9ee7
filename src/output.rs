use crate::model::{Containment, ProximityRecord};
use crate::proximity::proximity_label;
use anyhow::{bail, Context, Result};
use log::info;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn output_headers(input_headers: &[String], thresholds: &[f64]) -> Vec<String> {
    let mut headers = input_headers.to_vec();
    headers.extend(
        [
            "Distance to Nearest Port",
            "Proximity Port Name",
            "Port Latitude",
            "Port Longitude",
        ]
        .iter()
        .map(|h| h.to_string()),
    );
    headers.extend(thresholds.iter().map(|t| proximity_label(*t)));
    headers.push("Parked in Port".to_string());
    headers.push("Port Name".to_string());
    headers
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}

/// Floats always keep a decimal point, `-74.0` rather than `-74`.
fn float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 {
        format!("{:.1}", v)
    } else {
        v.to_string()
    }
}

fn optional(value: Option<f64>) -> String {
    value.map(float).unwrap_or_default()
}

pub fn output_row(record: &ProximityRecord, containment: &Containment) -> Vec<String> {
    let p = &record.proximity;
    let mut row = record.position.fields.clone();
    row.push(float(p.distance));
    row.push(p.port_name.clone());
    row.push(optional(p.port_lat));
    row.push(optional(p.port_lon));
    row.extend(p.within.iter().map(|w| yes_no(*w).to_string()));
    row.push(if containment.parked { "True" } else { "False" }.to_string());
    row.push(containment.port_name.clone());
    row
}

/// Write every record with its containment result, batch after batch, to
/// `path`. Rows go to a temporary file next to `path` that only replaces it
/// once everything was written, so a failed run leaves no output behind.
pub fn write_enriched<B>(
    path: &Path,
    input_headers: &[String],
    thresholds: &[f64],
    records: &[ProximityRecord],
    batches: B,
) -> Result<usize>
where
    B: IntoIterator<Item = Vec<Containment>>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;

    let mut wtr = csv::Writer::from_writer(tmp);
    wtr.write_record(output_headers(input_headers, thresholds))?;

    let mut written = 0;
    for batch in batches {
        for containment in batch {
            let record = match records.get(written) {
                Some(r) => r,
                None => bail!("more containment results than records ({})", records.len()),
            };
            wtr.write_record(output_row(record, &containment))?;
            written += 1;
        }
    }
    if written != records.len() {
        bail!(
            "containment produced {} results for {} records",
            written,
            records.len()
        );
    }

    let tmp = wtr
        .into_inner()
        .map_err(|e| e.into_error())
        .with_context(|| format!("failed to flush {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!("wrote {} rows to {}.", written, path.display());
    Ok(written)
}
