//! Raw and canonical feature representations.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single coordinate tuple: `[x, y]`, optionally followed by z and m.
pub type Position = Vec<f64>;

/// An Esri JSON feature as returned by a FeatureServer query page.
///
/// Lives only between the page fetch and geometry translation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawRecord {
    /// Source-native attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
    /// Esri geometry object (`{x,y}`, `{points}`, `{paths}` or `{rings}`).
    #[serde(default)]
    pub geometry: Option<Value>,
    /// Spatial reference declared for the whole page, if any.
    #[serde(skip)]
    pub page_wkid: Option<u32>,
}

/// GeoJSON geometry, serialized as `{"type": ..., "coordinates": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// GeoJSON type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Point(_) => "Point",
            Self::MultiPoint(_) => "MultiPoint",
            Self::LineString(_) => "LineString",
            Self::MultiLineString(_) => "MultiLineString",
            Self::Polygon(_) => "Polygon",
            Self::MultiPolygon(_) => "MultiPolygon",
        }
    }

    /// Apply `f` to every position in place.
    pub fn map_positions(mut self, f: impl Fn(&mut Position)) -> Self {
        match &mut self {
            Self::Point(p) => f(p),
            Self::MultiPoint(ps) | Self::LineString(ps) => ps.iter_mut().for_each(&f),
            Self::MultiLineString(parts) | Self::Polygon(parts) => {
                parts.iter_mut().flatten().for_each(&f)
            }
            Self::MultiPolygon(polys) => polys.iter_mut().flatten().flatten().for_each(&f),
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureType {
    Feature,
}

/// GeoJSON feature with canonical or (before field mapping) native properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFeature {
    #[serde(rename = "type")]
    pub kind: FeatureType,
    /// `None` serializes as `null`, which GeoJSON allows for unlocated features.
    pub geometry: Option<Geometry>,
    pub properties: Map<String, Value>,
}

impl CanonicalFeature {
    /// A `Feature` with the given geometry and properties.
    pub fn new(geometry: Option<Geometry>, properties: Map<String, Value>) -> Self {
        Self {
            kind: FeatureType::Feature,
            geometry,
            properties,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feature_serializes_as_geojson() {
        let mut props = Map::new();
        props.insert("state".into(), json!("NC"));
        let feature = CanonicalFeature::new(Some(Geometry::Point(vec![-78.9, 35.99])), props);

        assert_eq!(
            serde_json::to_value(&feature).unwrap(),
            json!({
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-78.9, 35.99]},
                "properties": {"state": "NC"}
            })
        );
    }

    #[test]
    fn test_null_geometry_serializes_as_null() {
        let feature = CanonicalFeature::new(None, Map::new());
        let value = serde_json::to_value(&feature).unwrap();
        assert!(value["geometry"].is_null());
    }

    #[test]
    fn test_map_positions_visits_every_vertex() {
        let geom = Geometry::MultiPolygon(vec![vec![
            vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 0.0]],
        ]]);
        let shifted = geom.map_positions(|p| p[0] += 10.0);
        let Geometry::MultiPolygon(polys) = shifted else {
            panic!("type changed");
        };
        assert!(polys[0][0].iter().all(|p| p[0] >= 10.0));
    }

    #[test]
    fn test_raw_record_defaults_missing_fields() {
        let raw: RawRecord = serde_json::from_value(json!({"attributes": {"A": 1}})).unwrap();
        assert!(raw.geometry.is_none());
        assert_eq!(raw.attributes["A"], 1);
        assert!(raw.page_wkid.is_none());
    }
}
