//! Road-network spatial index: optional per-mode evidence for the classifier.
//!
//! A [`RoadNetwork`] is an R-tree over the individual straight edges of
//! externally supplied route geometries (GeoJSON line features), built once
//! per analysis run and read-only afterwards, so it can be shared across
//! parallel analyses. Absence of a network for a mode is a valid
//! configuration, not an error.

use crate::error::{ItineraryError, Result};
use crate::geo_utils::point_to_segment_distance;
use crate::{GpsPoint, TransportMode};
use geo::LineString;
use geojson::{Feature, GeoJson, Geometry, Value};
use log::{debug, info};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// How many R-tree candidates to refine with exact meter distances. Raw
/// degree-space ordering is slightly anisotropic (longitude degrees shrink
/// with latitude), so the nearest edge by degrees is not always the nearest
/// by meters; a small candidate set absorbs that.
const REFINE_CANDIDATES: usize = 16;

/// One straight edge of a route geometry, indexed in degree space.
#[derive(Debug, Clone, Copy)]
struct RoadEdge {
    a: GpsPoint,
    b: GpsPoint,
}

impl RTreeObject for RoadEdge {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [
                self.a.longitude.min(self.b.longitude),
                self.a.latitude.min(self.b.latitude),
            ],
            [
                self.a.longitude.max(self.b.longitude),
                self.a.latitude.max(self.b.latitude),
            ],
        )
    }
}

impl PointDistance for RoadEdge {
    /// Squared degree-space distance from a `[lng, lat]` point to this edge.
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let ax = self.a.longitude - point[0];
        let ay = self.a.latitude - point[1];
        let bx = self.b.longitude - point[0];
        let by = self.b.latitude - point[1];

        let dx = bx - ax;
        let dy = by - ay;
        let len2 = dx * dx + dy * dy;
        if len2 == 0.0 {
            return ax * ax + ay * ay;
        }
        let t = (-(ax * dx + ay * dy) / len2).clamp(0.0, 1.0);
        let cx = ax + t * dx;
        let cy = ay + t * dy;
        cx * cx + cy * cy
    }
}

/// Immutable set of line geometries for one transport mode, supporting
/// nearest-distance queries from an arbitrary point.
#[derive(Debug)]
pub struct RoadNetwork {
    tree: RTree<RoadEdge>,
    edge_count: usize,
}

impl RoadNetwork {
    /// Build an index from line geometries. Degenerate inputs (lines with
    /// fewer than two coordinates) contribute nothing.
    pub fn from_linestrings(lines: &[LineString<f64>]) -> Self {
        let edges: Vec<RoadEdge> = lines
            .iter()
            .flat_map(|line| line.lines())
            .map(|l| RoadEdge {
                a: GpsPoint::new(l.start.y, l.start.x),
                b: GpsPoint::new(l.end.y, l.end.x),
            })
            .collect();
        let edge_count = edges.len();
        debug!("Built road network index with {} edges", edge_count);
        Self {
            tree: RTree::bulk_load(edges),
            edge_count,
        }
    }

    /// Load a network from a GeoJSON document. LineString and MultiLineString
    /// geometries are indexed (from a FeatureCollection, a single Feature or
    /// a bare geometry); other geometry kinds are ignored.
    pub fn from_geojson_str(content: &str) -> Result<Self> {
        let geojson: GeoJson = content.parse().map_err(|e| ItineraryError::GeometryLoad {
            message: format!("GeoJSON parse error: {}", e),
        })?;

        let mut lines = Vec::new();
        match geojson {
            GeoJson::FeatureCollection(collection) => {
                for feature in collection.features {
                    collect_feature_lines(&feature, &mut lines);
                }
            }
            GeoJson::Feature(feature) => collect_feature_lines(&feature, &mut lines),
            GeoJson::Geometry(geometry) => collect_geometry_lines(&geometry, &mut lines),
        }

        if lines.is_empty() {
            return Err(ItineraryError::GeometryLoad {
                message: "no line geometries found".to_string(),
            });
        }
        Ok(Self::from_linestrings(&lines))
    }

    /// Load a network from a GeoJSON file.
    pub fn from_geojson_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| ItineraryError::GeometryLoad {
            message: format!("cannot read {}: {}", path.display(), e),
        })?;
        let network = Self::from_geojson_str(&content)?;
        info!(
            "Loaded road network from {} ({} edges)",
            path.display(),
            network.edge_count
        );
        Ok(network)
    }

    /// Number of indexed edges.
    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Distance in meters from a point to the nearest indexed edge, or
    /// `None` for an empty network.
    pub fn nearest_distance(&self, point: &GpsPoint) -> Option<f64> {
        let query = [point.longitude, point.latitude];
        self.tree
            .nearest_neighbor_iter(&query)
            .take(REFINE_CANDIDATES)
            .map(|edge| point_to_segment_distance(point, &edge.a, &edge.b))
            .fold(None, |best, d| {
                Some(best.map_or(d, |b: f64| b.min(d)))
            })
    }

    /// Maximum point-to-network deviation over a set of positions, in meters.
    /// `None` if the network or the point set is empty.
    pub fn max_deviation(&self, points: &[GpsPoint]) -> Option<f64> {
        if points.is_empty() {
            return None;
        }
        points
            .iter()
            .map(|p| self.nearest_distance(p))
            .try_fold(0.0_f64, |max, d| d.map(|d| max.max(d)))
    }
}

fn collect_feature_lines(feature: &Feature, lines: &mut Vec<LineString<f64>>) {
    if let Some(geometry) = &feature.geometry {
        collect_geometry_lines(geometry, lines);
    }
}

fn collect_geometry_lines(geometry: &Geometry, lines: &mut Vec<LineString<f64>>) {
    match &geometry.value {
        Value::LineString(coords) => lines.push(linestring_from_coords(coords)),
        Value::MultiLineString(multi) => {
            for coords in multi {
                lines.push(linestring_from_coords(coords));
            }
        }
        Value::GeometryCollection(members) => {
            for member in members {
                collect_geometry_lines(member, lines);
            }
        }
        _ => {}
    }
}

fn linestring_from_coords(coords: &[Vec<f64>]) -> LineString<f64> {
    LineString::from(
        coords
            .iter()
            .filter(|c| c.len() >= 2)
            .map(|c| (c[0], c[1]))
            .collect::<Vec<(f64, f64)>>(),
    )
}

/// Capability-keyed mapping from transport mode to an optional road network.
/// The only object shared across parallel analyses; read-only after
/// construction.
#[derive(Debug, Default)]
pub struct RoadNetworkSet {
    networks: HashMap<TransportMode, RoadNetwork>,
}

impl RoadNetworkSet {
    /// An empty set: every mode then relies on speed evidence alone.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-built network for a mode.
    pub fn insert(&mut self, mode: TransportMode, network: RoadNetwork) {
        self.networks.insert(mode, network);
    }

    /// Load a mode's network from a GeoJSON file.
    pub fn load<P: AsRef<Path>>(&mut self, mode: TransportMode, path: P) -> Result<()> {
        let network = RoadNetwork::from_geojson_file(path)?;
        self.networks.insert(mode, network);
        Ok(())
    }

    /// The network for a mode, if one was supplied.
    pub fn get(&self, mode: TransportMode) -> Option<&RoadNetwork> {
        self.networks.get(&mode)
    }

    /// Whether any network was supplied at all.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn north_south_line(lng: f64) -> LineString<f64> {
        LineString::new(vec![
            Coord { x: lng, y: 47.00 },
            Coord { x: lng, y: 47.01 },
            Coord { x: lng, y: 47.02 },
        ])
    }

    #[test]
    fn test_nearest_distance_on_and_off_line() {
        let network = RoadNetwork::from_linestrings(&[north_south_line(8.0)]);
        assert_eq!(network.edge_count(), 2);

        let on_line = GpsPoint::new(47.005, 8.0);
        assert!(network.nearest_distance(&on_line).unwrap() < 0.5);

        // ~75 m east of the line at this latitude.
        let off_line = GpsPoint::new(47.005, 8.001);
        let d = network.nearest_distance(&off_line).unwrap();
        assert!((d - 75.9).abs() < 2.0, "got {}", d);
    }

    #[test]
    fn test_empty_network_has_no_nearest() {
        let network = RoadNetwork::from_linestrings(&[]);
        assert!(network
            .nearest_distance(&GpsPoint::new(47.0, 8.0))
            .is_none());
        assert!(network.max_deviation(&[GpsPoint::new(47.0, 8.0)]).is_none());
    }

    #[test]
    fn test_max_deviation() {
        let network = RoadNetwork::from_linestrings(&[north_south_line(8.0)]);
        let points = vec![
            GpsPoint::new(47.005, 8.0),
            GpsPoint::new(47.010, 8.001), // the farthest point
        ];
        let dev = network.max_deviation(&points).unwrap();
        assert!((dev - 75.9).abs() < 2.0, "got {}", dev);
    }

    #[test]
    fn test_from_geojson_feature_collection() {
        let doc = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "LineString",
                              "coordinates": [[8.0, 47.0], [8.0, 47.01]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "MultiLineString",
                              "coordinates": [[[8.1, 47.0], [8.1, 47.01]],
                                              [[8.2, 47.0], [8.2, 47.01]]]}},
                {"type": "Feature", "properties": {},
                 "geometry": {"type": "Point", "coordinates": [8.3, 47.0]}}
            ]
        }"#;
        let network = RoadNetwork::from_geojson_str(doc).unwrap();
        assert_eq!(network.edge_count(), 3);
    }

    #[test]
    fn test_from_geojson_bare_geometry() {
        let doc = r#"{"type": "LineString", "coordinates": [[8.0, 47.0], [8.0, 47.01]]}"#;
        let network = RoadNetwork::from_geojson_str(doc).unwrap();
        assert_eq!(network.edge_count(), 1);
    }

    #[test]
    fn test_from_geojson_without_lines_is_an_error() {
        let doc = r#"{"type": "Point", "coordinates": [8.0, 47.0]}"#;
        assert!(matches!(
            RoadNetwork::from_geojson_str(doc),
            Err(ItineraryError::GeometryLoad { .. })
        ));
    }

    #[test]
    fn test_network_set_missing_mode_is_valid() {
        let mut set = RoadNetworkSet::new();
        assert!(set.is_empty());
        set.insert(
            TransportMode::Car,
            RoadNetwork::from_linestrings(&[north_south_line(8.0)]),
        );
        assert!(set.get(TransportMode::Car).is_some());
        assert!(set.get(TransportMode::Bicycle).is_none());
    }
}
