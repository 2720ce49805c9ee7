//! Nearest-port lookup.
//!
//! Ports are indexed as planar `[lat, lon]` points and distances are plain
//! Euclidean distances in degrees, the same space the thresholds are compared
//! in. This is an approximation of kilometres, not a geodesic distance.

use crate::error::PipelineError;
use crate::model::{Port, PositionTable, Proximity, ProximityRecord, NO_PORT};
use anyhow::Result;
use log::info;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

struct IndexedPort {
    lat: f64,
    lon: f64,
    idx: usize,
}

impl RTreeObject for IndexedPort {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lat, self.lon])
    }
}

impl PointDistance for IndexedPort {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dlat = self.lat - point[0];
        let dlon = self.lon - point[1];
        dlat * dlat + dlon * dlon
    }
}

pub struct PortIndex {
    ports: Vec<Port>,
    tree: RTree<IndexedPort>,
}

impl PortIndex {
    pub fn build(ports: Vec<Port>) -> Result<Self> {
        if ports.is_empty() {
            return Err(PipelineError::NoPorts("<port index>".to_string()).into());
        }
        let indexed = ports
            .iter()
            .enumerate()
            .map(|(idx, p)| IndexedPort {
                lat: p.lat,
                lon: p.lon,
                idx,
            })
            .collect();

        Ok(PortIndex {
            ports,
            tree: RTree::bulk_load(indexed),
        })
    }

    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Closest port and its distance. Equidistant ports resolve to whichever
    /// the tree visits first.
    pub fn nearest(&self, lat: f64, lon: f64) -> (&Port, f64) {
        let query = [lat, lon];
        match self.tree.nearest_neighbor(&query) {
            Some(hit) => (&self.ports[hit.idx], hit.distance_2(&query).sqrt()),
            // the tree is never empty, see `build`.
            None => unreachable!("port index is empty"),
        }
    }
}

pub fn proximity_label(threshold: f64) -> String {
    format!("Less than {} km from port", threshold)
}

/// Distance, nearest port and threshold flags for one position. When no
/// threshold is met the port identity is replaced by the "No" sentinel but
/// the distance is kept.
pub fn proximity_for(index: &PortIndex, lat: f64, lon: f64, thresholds: &[f64]) -> Proximity {
    let (port, distance) = index.nearest(lat, lon);
    let within: Vec<bool> = thresholds.iter().map(|t| distance <= *t).collect();

    if within.iter().any(|w| *w) {
        Proximity {
            distance,
            port_name: port.name.clone(),
            port_lat: Some(port.lat),
            port_lon: Some(port.lon),
            within,
        }
    } else {
        Proximity {
            distance,
            port_name: NO_PORT.to_string(),
            port_lat: None,
            port_lon: None,
            within,
        }
    }
}

pub fn annotate_proximity(
    table: PositionTable,
    index: &PortIndex,
    thresholds: &[f64],
) -> Vec<ProximityRecord> {
    let records: Vec<ProximityRecord> = table
        .records
        .into_iter()
        .map(|position| {
            let proximity = proximity_for(index, position.lat, position.lon, thresholds);
            ProximityRecord {
                position,
                proximity,
            }
        })
        .collect();

    let near = records
        .iter()
        .filter(|r| r.proximity.is_near_any_port())
        .count();
    info!(
        "{} of {} records are within {} of a port.",
        near,
        records.len(),
        thresholds
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max)
    );

    records
}

#[cfg(test)]
mod tests {
    use super::*;

    static THRESHOLDS: [f64; 4] = [1.0, 3.0, 5.0, 10.0];

    fn port(name: &str, lat: f64, lon: f64) -> Port {
        Port {
            name: name.to_string(),
            lat,
            lon,
        }
    }

    fn ports() -> Vec<Port> {
        vec![
            port("Aarhus", 56.15, 10.22),
            port("Skagen", 57.72, 10.59),
            port("Gothenburg", 57.70, 11.94),
            port("Rotterdam", 51.95, 4.13),
            port("New York", 40.70, -74.01),
        ]
    }

    #[test]
    fn test_nearest_matches_brute_force() {
        let index = PortIndex::build(ports()).unwrap();
        let queries = [
            (56.0, 10.0),
            (57.7, 11.0),
            (0.0, 0.0),
            (45.0, -30.0),
            (52.0, 4.5),
            (-33.0, 151.0),
        ];
        for (lat, lon) in queries {
            let (found, distance) = index.nearest(lat, lon);
            let best = ports()
                .iter()
                .map(|p| ((p.lat - lat).powi(2) + (p.lon - lon).powi(2)).sqrt())
                .fold(f64::INFINITY, f64::min);
            assert!((distance - best).abs() < 1e-12);
            let own = ((found.lat - lat).powi(2) + (found.lon - lon).powi(2)).sqrt();
            assert!((own - best).abs() < 1e-12);
        }
    }

    #[test]
    fn test_close_port_sets_every_flag() {
        let index = PortIndex::build(vec![port("Test Port", 40.001, -74.0)]).unwrap();
        let p = proximity_for(&index, 40.0, -74.0, &THRESHOLDS);

        assert!(p.distance < 1.0);
        assert_eq!(p.within, vec![true, true, true, true]);
        assert_eq!(p.port_name, "Test Port");
        assert_eq!(p.port_lat, Some(40.001));
        assert_eq!(p.port_lon, Some(-74.0));
    }

    #[test]
    fn test_far_port_is_suppressed_but_distance_kept() {
        let index = PortIndex::build(vec![port("Test Port", 60.0, -74.0)]).unwrap();
        let p = proximity_for(&index, 40.0, -74.0, &THRESHOLDS);

        assert!((p.distance - 20.0).abs() < 1e-9);
        assert_eq!(p.within, vec![false; 4]);
        assert_eq!(p.port_name, NO_PORT);
        assert_eq!(p.port_lat, None);
        assert_eq!(p.port_lon, None);
    }

    #[test]
    fn test_flags_are_nested() {
        let index = PortIndex::build(ports()).unwrap();
        for i in 0..200 {
            let lat = 50.0 + (i as f64) * 0.05;
            let lon = 3.0 + (i as f64) * 0.04;
            let p = proximity_for(&index, lat, lon, &THRESHOLDS);
            for w in p.within.windows(2) {
                assert!(!w[0] || w[1]);
            }
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let index = PortIndex::build(vec![port("Edge", 0.0, 3.0)]).unwrap();
        let p = proximity_for(&index, 0.0, 0.0, &THRESHOLDS);
        assert_eq!(p.within, vec![false, true, true, true]);
    }

    #[test]
    fn test_labels() {
        assert_eq!(proximity_label(1.0), "Less than 1 km from port");
        assert_eq!(proximity_label(2.5), "Less than 2.5 km from port");
    }

    #[test]
    fn test_empty_index_is_rejected() {
        assert!(PortIndex::build(Vec::new()).is_err());
    }
}
