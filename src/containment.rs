use crate::crs::{is_lon_lat, Crs};
use crate::error::PipelineError;
use crate::model::{Containment, PolygonRow, PortPolygon, ProximityRecord};
use anyhow::Result;
use geo::{BoundingRect, Contains, Geometry, MapCoords, MultiPolygon, Point, Polygon, Relate};
use log::{debug, info, warn};
use rayon::prelude::*;
use rstar::{RTree, RTreeObject, AABB};
use wkt::TryFromWkt;

/// Bounding box of one port polygon, in `[lon, lat]`.
struct PolygonEnvelope {
    idx: usize,
    env: AABB<[f64; 2]>,
}

impl RTreeObject for PolygonEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.env
    }
}

/// Port boundaries in EPSG:4326 with a bounding-box index over them.
pub struct PortPolygons {
    polygons: Vec<PortPolygon>,
    tree: RTree<PolygonEnvelope>,
}

impl PortPolygons {
    /// Parse WKT rows given in `crs`, reproject to lon/lat and index them.
    /// Any malformed geometry aborts the whole load.
    pub fn from_rows(rows: Vec<PolygonRow>, crs: Crs) -> Result<Self> {
        let polygons = rows
            .into_iter()
            .map(|row| parse_polygon(row, crs))
            .collect::<Result<Vec<PortPolygon>, PipelineError>>()?;
        Self::new(polygons)
    }

    pub fn new(polygons: Vec<PortPolygon>) -> Result<Self> {
        let mut envelopes = Vec::with_capacity(polygons.len());
        for (idx, p) in polygons.iter().enumerate() {
            let rect = p
                .boundary
                .bounding_rect()
                .ok_or_else(|| PipelineError::MalformedPolygon {
                    port: p.name.clone(),
                    reason: "empty geometry".to_string(),
                })?;
            envelopes.push(PolygonEnvelope {
                idx,
                env: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            });
        }

        let polygons = PortPolygons {
            polygons,
            tree: RTree::bulk_load(envelopes),
        };
        polygons.warn_overlaps();
        info!("loaded {} port polygons.", polygons.len());
        Ok(polygons)
    }

    pub fn len(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Polygon strictly containing the point. Points on a boundary are
    /// outside. With overlapping polygons the earliest in table order wins.
    pub fn locate(&self, lon: f64, lat: f64) -> Option<&PortPolygon> {
        let point = Point::new(lon, lat);
        self.tree
            .locate_in_envelope_intersecting(&AABB::from_point([lon, lat]))
            .filter(|c| self.polygons[c.idx].boundary.contains(&point))
            .map(|c| c.idx)
            .min()
            .map(|idx| &self.polygons[idx])
    }

    fn warn_overlaps(&self) {
        for candidate in self.tree.iter() {
            let a = &self.polygons[candidate.idx];
            for other in self.tree.locate_in_envelope_intersecting(&candidate.env) {
                if other.idx <= candidate.idx {
                    continue;
                }
                let b = &self.polygons[other.idx];
                let matrix = a.boundary.relate(&b.boundary);
                if matrix.is_intersects() && !matrix.is_touches() {
                    warn!(
                        "port polygons `{}` and `{}` overlap; points in both resolve to `{}`.",
                        a.name, b.name, a.name
                    );
                }
            }
        }
    }
}

fn parse_polygon(row: PolygonRow, crs: Crs) -> Result<PortPolygon, PipelineError> {
    let malformed = |reason: String| PipelineError::MalformedPolygon {
        port: row.port_name.clone(),
        reason,
    };

    let geometry = Geometry::<f64>::try_from_wkt_str(&row.polygon)
        .map_err(|e| malformed(e.to_string()))?;
    let boundary = match geometry {
        Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
        Geometry::MultiPolygon(mp) => mp,
        other => return Err(malformed(format!("expected a polygon, got {:?}", other))),
    };
    if boundary.0.is_empty() {
        return Err(malformed("empty geometry".to_string()));
    }
    for polygon in &boundary.0 {
        check_rings(polygon).map_err(malformed)?;
    }

    let boundary = boundary.map_coords(|c| crs.to_lon_lat(c));
    for polygon in &boundary.0 {
        let outside = polygon
            .exterior()
            .coords()
            .chain(polygon.interiors().iter().flat_map(|r| r.coords()))
            .find(|c| !is_lon_lat(**c));
        if let Some(c) = outside {
            return Err(malformed(format!(
                "coordinate ({}, {}) is not a valid longitude/latitude after reprojection from {}",
                c.x, c.y, crs
            )));
        }
    }

    Ok(PortPolygon {
        name: row.port_name,
        boundary,
    })
}

fn check_rings(polygon: &Polygon<f64>) -> Result<(), String> {
    for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
        // geo closes rings, so a triangle has four positions.
        if ring.0.len() < 4 {
            return Err(format!("ring has {} positions, need at least 4", ring.0.len()));
        }
        if ring.coords().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err("ring has a non-finite coordinate".to_string());
        }
    }
    Ok(())
}

pub fn contain_batch(batch: &[ProximityRecord], polygons: &PortPolygons) -> Vec<Containment> {
    batch
        .iter()
        .map(|r| match polygons.locate(r.position.lon, r.position.lat) {
            Some(polygon) => Containment {
                parked: true,
                port_name: polygon.name.clone(),
            },
            None => Containment::outside(),
        })
        .collect()
}

fn check_batch_size(batch_size: usize) -> Result<(), PipelineError> {
    if batch_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "batch size must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Lazily evaluated containment results, one `Vec` per contiguous batch of
/// `batch_size` records. A batch size of 0 is rejected.
pub fn containment_batches<'a>(
    records: &'a [ProximityRecord],
    polygons: &'a PortPolygons,
    batch_size: usize,
) -> Result<impl Iterator<Item = Vec<Containment>> + 'a, PipelineError> {
    check_batch_size(batch_size)?;
    let total = records.len();
    Ok(records
        .chunks(batch_size)
        .enumerate()
        .map(move |(i, batch)| {
            debug!(
                "containment batch {} ({} of {} records).",
                i + 1,
                (i * batch_size + batch.len()).min(total),
                total
            );
            contain_batch(batch, polygons)
        }))
}

/// Same batches as `containment_batches`, computed on the rayon pool and
/// returned in batch order.
pub fn containment_batches_parallel(
    records: &[ProximityRecord],
    polygons: &PortPolygons,
    batch_size: usize,
) -> Result<Vec<Vec<Containment>>, PipelineError> {
    check_batch_size(batch_size)?;
    Ok(records
        .par_chunks(batch_size)
        .map(|batch| contain_batch(batch, polygons))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PositionRecord, Proximity, NO_PORT};

    fn row(name: &str, wkt: &str) -> PolygonRow {
        PolygonRow {
            port_name: name.to_string(),
            polygon: wkt.to_string(),
        }
    }

    fn harbours() -> PortPolygons {
        PortPolygons::from_rows(
            vec![
                row("Aarhus", "POLYGON ((10.0 56.0, 10.5 56.0, 10.5 56.5, 10.0 56.5, 10.0 56.0))"),
                row(
                    "Skagen",
                    "MULTIPOLYGON (((10.5 57.5, 11.0 57.5, 11.0 58.0, 10.5 58.0, 10.5 57.5)))",
                ),
            ],
            Crs::Wgs84,
        )
        .unwrap()
    }

    fn record(lat: f64, lon: f64) -> ProximityRecord {
        ProximityRecord {
            position: PositionRecord {
                fields: vec![lat.to_string(), lon.to_string()],
                lat,
                lon,
                speed: 0.0,
            },
            proximity: Proximity {
                distance: 0.0,
                port_name: NO_PORT.to_string(),
                port_lat: None,
                port_lon: None,
                within: vec![],
            },
        }
    }

    #[test]
    fn test_locate_inside_and_outside() {
        let polygons = harbours();
        assert_eq!(polygons.locate(10.2, 56.2).map(|p| p.name.as_str()), Some("Aarhus"));
        assert_eq!(polygons.locate(10.7, 57.7).map(|p| p.name.as_str()), Some("Skagen"));
        assert!(polygons.locate(12.0, 56.2).is_none());
    }

    #[test]
    fn test_boundary_is_not_inside() {
        let polygons = harbours();
        assert!(polygons.locate(10.0, 56.2).is_none());
        assert!(polygons.locate(10.5, 56.5).is_none());
    }

    #[test]
    fn test_overlap_resolves_to_first_polygon() {
        let polygons = PortPolygons::from_rows(
            vec![
                row("First", "POLYGON ((0 0, 2 0, 2 2, 0 2, 0 0))"),
                row("Second", "POLYGON ((1 1, 3 1, 3 3, 1 3, 1 1))"),
            ],
            Crs::Wgs84,
        )
        .unwrap();
        assert_eq!(polygons.locate(1.5, 1.5).unwrap().name, "First");
        assert_eq!(polygons.locate(2.5, 2.5).unwrap().name, "Second");
    }

    #[test]
    fn test_web_mercator_polygon_is_reprojected() {
        // roughly the square 10..11 E, 56..57 N
        let polygons = PortPolygons::from_rows(
            vec![row(
                "Kattegat",
                "POLYGON ((1113194.9 7558415.7, 1224514.4 7558415.7, 1224514.4 7760118.7, \
                 1113194.9 7760118.7, 1113194.9 7558415.7))",
            )],
            Crs::WebMercator,
        )
        .unwrap();
        assert_eq!(polygons.locate(10.5, 56.5).unwrap().name, "Kattegat");
        assert!(polygons.locate(10.5, 57.5).is_none());
    }

    #[test]
    fn test_malformed_geometry_is_fatal() {
        let bad_wkt = PortPolygons::from_rows(vec![row("Bad", "POLYGON ((0 0, 1 1")], Crs::Wgs84);
        assert!(bad_wkt.is_err());

        let point = PortPolygons::from_rows(vec![row("Point", "POINT (1 1)")], Crs::Wgs84);
        assert!(point.is_err());

        // metres read as degrees
        let wrong_crs = PortPolygons::from_rows(
            vec![row("Metres", "POLYGON ((1113194 7558415, 1224514 7558415, 1224514 7760118, 1113194 7558415))")],
            Crs::Wgs84,
        );
        assert!(wrong_crs.is_err());
    }

    #[test]
    fn test_batch_size_does_not_change_results() {
        let polygons = harbours();
        let records: Vec<ProximityRecord> = (0..57)
            .map(|i| record(55.9 + (i as f64) * 0.04, 9.9 + (i as f64) * 0.02))
            .collect();

        let one: Vec<Containment> = containment_batches(&records, &polygons, 1)
            .unwrap()
            .flatten()
            .collect();
        let all: Vec<Containment> = containment_batches(&records, &polygons, records.len())
            .unwrap()
            .flatten()
            .collect();
        let odd: Vec<Containment> = containment_batches(&records, &polygons, 7)
            .unwrap()
            .flatten()
            .collect();
        let parallel: Vec<Containment> = containment_batches_parallel(&records, &polygons, 5)
            .unwrap()
            .into_iter()
            .flatten()
            .collect();

        assert_eq!(one.len(), records.len());
        assert_eq!(one, all);
        assert_eq!(one, odd);
        assert_eq!(one, parallel);
        assert!(one.iter().any(|c| c.parked));
        assert!(one.iter().any(|c| !c.parked));
    }

    #[test]
    fn test_parked_iff_inside_exactly_one_polygon() {
        let polygons = harbours();
        let records: Vec<ProximityRecord> = (0..100)
            .map(|i| record(55.8 + (i as f64) * 0.025, 9.8 + (i as f64) * 0.013))
            .collect();

        for (r, c) in records.iter().zip(contain_batch(&records, &polygons)) {
            let point = Point::new(r.position.lon, r.position.lat);
            let hits: Vec<&PortPolygon> = polygons
                .polygons
                .iter()
                .filter(|p| p.boundary.contains(&point))
                .collect();
            assert_eq!(c.parked, hits.len() == 1);
            match hits.first() {
                Some(p) => assert_eq!(c.port_name, p.name),
                None => assert_eq!(c.port_name, NO_PORT),
            }
        }
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let polygons = harbours();
        let records = vec![record(56.2, 10.2)];
        assert!(containment_batches(&records, &polygons, 0).is_err());
        assert!(containment_batches_parallel(&records, &polygons, 0).is_err());
    }
}
