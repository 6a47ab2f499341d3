//! Esri JSON to GeoJSON geometry translation.
//!
//! Handles the four Esri geometry encodings:
//!
//! | Esri            | GeoJSON                              |
//! |-----------------|--------------------------------------|
//! | `{x, y[, z]}`   | `Point`                              |
//! | `{points}`      | `Point` (one point) / `MultiPoint`   |
//! | `{paths}`       | `LineString` / `MultiLineString`     |
//! | `{rings}`       | `Polygon` / `MultiPolygon`           |
//!
//! Esri rings are clockwise for exteriors and counter-clockwise for holes,
//! with no explicit nesting. GeoJSON wants explicit polygons with
//! counter-clockwise exteriors, so rings are classified by winding and each
//! hole is attached to the exterior that contains it.
//!
//! Geometries tagged with a Web Mercator spatial reference are projected
//! back to WGS84 degrees.

use crate::error::GeometryError;
use crate::normalize::feature::{CanonicalFeature, Geometry, Position, RawRecord};
use serde_json::{Map, Value};

/// WKIDs that denote spherical Web Mercator.
const WEB_MERCATOR_WKIDS: [u32; 4] = [102100, 102113, 3857, 900913];

const EARTH_RADIUS: f64 = 6_378_137.0;

/// Translate a raw Esri record into a GeoJSON feature.
///
/// Properties are carried over untouched (still source-native keys).
/// A missing, `null` or empty geometry object yields a `null` geometry.
pub fn translate(raw: &RawRecord) -> Result<CanonicalFeature, GeometryError> {
    let geometry = match &raw.geometry {
        None | Some(Value::Null) => None,
        Some(Value::Object(obj)) if obj.is_empty() => None,
        Some(Value::Object(obj)) => Some(translate_geometry(obj, raw.page_wkid)?),
        Some(other) => {
            return Err(GeometryError::Unrecognized(format!(
                "geometry is a {}",
                json_kind(other)
            )))
        }
    };

    Ok(CanonicalFeature::new(geometry, raw.attributes.clone()))
}

fn translate_geometry(
    obj: &Map<String, Value>,
    page_wkid: Option<u32>,
) -> Result<Geometry, GeometryError> {
    let geometry = if obj.contains_key("x") && obj.contains_key("y") {
        Geometry::Point(point_from_xyz(obj)?)
    } else if let Some(points) = obj.get("points") {
        let mut points = parse_positions(points, "points")?;
        match points.len() {
            0 => return Err(GeometryError::Malformed("multipoint has no points".into())),
            1 => Geometry::Point(points.remove(0)),
            _ => Geometry::MultiPoint(points),
        }
    } else if let Some(paths) = obj.get("paths") {
        let mut paths = parse_parts(paths, "paths")?;
        if let Some(short) = paths.iter().find(|p| p.len() < 2) {
            return Err(GeometryError::Malformed(format!(
                "path has {} position(s), need at least 2",
                short.len()
            )));
        }
        match paths.len() {
            0 => return Err(GeometryError::Malformed("polyline has no paths".into())),
            1 => Geometry::LineString(paths.remove(0)),
            _ => Geometry::MultiLineString(paths),
        }
    } else if let Some(rings) = obj.get("rings") {
        let rings = parse_parts(rings, "rings")?
            .into_iter()
            .map(close_ring)
            .collect::<Result<Vec<_>, _>>()?;
        if rings.is_empty() {
            return Err(GeometryError::Malformed("polygon has no rings".into()));
        }
        rings_to_geometry(rings)
    } else {
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        return Err(GeometryError::Unrecognized(format!("keys: {}", keys.join(", "))));
    };

    let wkid = spatial_reference_wkid(obj.get("spatialReference")).or(page_wkid);
    if wkid.is_some_and(|w| WEB_MERCATOR_WKIDS.contains(&w)) {
        Ok(geometry.map_positions(mercator_to_geographic))
    } else {
        Ok(geometry)
    }
}

/// Read `latestWkid`, falling back to `wkid`.
pub(crate) fn spatial_reference_wkid(sr: Option<&Value>) -> Option<u32> {
    let sr = sr?;
    sr.get("latestWkid")
        .and_then(Value::as_u64)
        .or_else(|| sr.get("wkid").and_then(Value::as_u64))
        .and_then(|w| u32::try_from(w).ok())
}

fn point_from_xyz(obj: &Map<String, Value>) -> Result<Position, GeometryError> {
    let mut pos = Vec::with_capacity(3);
    for axis in ["x", "y", "z"] {
        match obj.get(axis) {
            Some(Value::Null) | None if axis == "z" => {}
            Some(v) => pos.push(finite(v, axis)?),
            None => return Err(GeometryError::Malformed(format!("point is missing {axis}"))),
        }
    }
    Ok(pos)
}

fn finite(v: &Value, what: &str) -> Result<f64, GeometryError> {
    match v.as_f64() {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(GeometryError::Malformed(format!("{what} is not a finite number: {v}"))),
    }
}

fn parse_position(v: &Value) -> Result<Position, GeometryError> {
    let arr = v
        .as_array()
        .ok_or_else(|| GeometryError::Malformed(format!("position is not an array: {v}")))?;
    if !(2..=4).contains(&arr.len()) {
        return Err(GeometryError::Malformed(format!(
            "position has {} ordinates, expected 2 to 4",
            arr.len()
        )));
    }
    arr.iter().map(|n| finite(n, "ordinate")).collect()
}

fn parse_positions(v: &Value, what: &str) -> Result<Vec<Position>, GeometryError> {
    v.as_array()
        .ok_or_else(|| GeometryError::Malformed(format!("{what} is not an array")))?
        .iter()
        .map(parse_position)
        .collect()
}

fn parse_parts(v: &Value, what: &str) -> Result<Vec<Vec<Position>>, GeometryError> {
    v.as_array()
        .ok_or_else(|| GeometryError::Malformed(format!("{what} is not an array")))?
        .iter()
        .map(|part| parse_positions(part, what))
        .collect()
}

/// Close an open ring and require the four positions a linear ring needs.
fn close_ring(mut ring: Vec<Position>) -> Result<Vec<Position>, GeometryError> {
    if let (Some(first), Some(last)) = (ring.first(), ring.last()) {
        if first[..2] != last[..2] {
            let first = first.clone();
            ring.push(first);
        }
    }
    if ring.len() < 4 {
        return Err(GeometryError::Malformed(format!(
            "ring has {} position(s), need at least 4",
            ring.len()
        )));
    }
    Ok(ring)
}

/// Shoelace sum; positive for clockwise rings in a y-up plane.
fn ring_is_clockwise(ring: &[Position]) -> bool {
    let total: f64 = ring
        .windows(2)
        .map(|w| (w[1][0] - w[0][0]) * (w[1][1] + w[0][1]))
        .sum();
    total >= 0.0
}

/// Ray-casting point-in-ring test.
fn ring_contains(ring: &[Position], point: &Position) -> bool {
    let (x, y) = (point[0], point[1]);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i][0], ring[i][1]);
        let (xj, yj) = (ring[j][0], ring[j][1]);
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn rings_to_geometry(rings: Vec<Vec<Position>>) -> Geometry {
    let mut polygons: Vec<Vec<Vec<Position>>> = Vec::new();
    let mut holes: Vec<Vec<Position>> = Vec::new();

    for mut ring in rings {
        if ring_is_clockwise(&ring) {
            ring.reverse();
            polygons.push(vec![ring]);
        } else {
            ring.reverse();
            holes.push(ring);
        }
    }

    for mut hole in holes {
        let owner = polygons
            .iter_mut()
            .find(|poly| ring_contains(&poly[0], &hole[0]));
        match owner {
            Some(poly) => poly.push(hole),
            None => {
                // A hole outside every exterior is promoted to an exterior.
                hole.reverse();
                polygons.push(vec![hole]);
            }
        }
    }

    if polygons.len() == 1 {
        Geometry::Polygon(polygons.remove(0))
    } else {
        Geometry::MultiPolygon(polygons)
    }
}

fn mercator_to_geographic(pos: &mut Position) {
    let degrees = 180.0 / std::f64::consts::PI;
    let lng = pos[0] / EARTH_RADIUS * degrees;
    let lat = (std::f64::consts::FRAC_PI_2 - 2.0 * (-pos[1] / EARTH_RADIUS).exp().atan()) * degrees;
    pos[0] = lng - ((lng + 180.0) / 360.0).floor() * 360.0;
    pos[1] = lat;
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
