//! Record normalization: Esri JSON to GeoJSON, then onto the canonical
//! address schema.

pub mod feature;
pub mod field_map;
pub mod geometry;

pub use feature::{CanonicalFeature, Geometry, Position, RawRecord};
pub use field_map::{swizzle, CanonicalField, CompiledFieldMap, PROVENANCE_KEY};
pub use geometry::translate;
