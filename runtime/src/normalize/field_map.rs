//! Projection of source-native attributes onto the canonical address schema.

use crate::config::SourceDescriptor;
use crate::normalize::feature::CanonicalFeature;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Property key carrying the originating feature service URL.
pub const PROVENANCE_KEY: &str = "sourceService";

/// The fixed set of attribute names every normalized feature is projected onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    State,
    County,
    IncorporatedMunicipality,
    UnincorpCounty,
    PostalCommunityName,
    ZipCode,
    StreetName,
    AddressNumber,
    Guid,
    AddressType,
    AddressPlacement,
    AddressSource,
    AddressAuthority,
    DateLastUpdated,
}

impl CanonicalField {
    pub const ALL: [CanonicalField; 14] = [
        Self::State,
        Self::County,
        Self::IncorporatedMunicipality,
        Self::UnincorpCounty,
        Self::PostalCommunityName,
        Self::ZipCode,
        Self::StreetName,
        Self::AddressNumber,
        Self::Guid,
        Self::AddressType,
        Self::AddressPlacement,
        Self::AddressSource,
        Self::AddressAuthority,
        Self::DateLastUpdated,
    ];

    /// Property key used in normalized output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::State => "state",
            Self::County => "county",
            Self::IncorporatedMunicipality => "incorporatedMunicipality",
            Self::UnincorpCounty => "unincorpCounty",
            Self::PostalCommunityName => "postalCommunityName",
            Self::ZipCode => "zipCode",
            Self::StreetName => "streetName",
            Self::AddressNumber => "addressNumber",
            Self::Guid => "guid",
            Self::AddressType => "addressType",
            Self::AddressPlacement => "addressPlacement",
            Self::AddressSource => "addressSource",
            Self::AddressAuthority => "addressAuthority",
            Self::DateLastUpdated => "dateLastUpdated",
        }
    }

    /// Whether `key` is a canonical property key or the provenance key.
    pub fn is_output_key(key: &str) -> bool {
        key == PROVENANCE_KEY || Self::ALL.iter().any(|f| f.as_str() == key)
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source's field map compiled into a canonical -> native lookup table.
///
/// Built once per source and applied to every record of that source.
#[derive(Debug, Clone)]
pub struct CompiledFieldMap {
    entries: Vec<(&'static str, String)>,
}

impl CompiledFieldMap {
    /// Flatten a configured field map into lookup entries.
    pub fn compile(field_map: &BTreeMap<CanonicalField, String>) -> Self {
        Self {
            entries: field_map
                .iter()
                .map(|(field, native)| (field.as_str(), native.clone()))
                .collect(),
        }
    }

    /// Number of canonical fields this map can populate.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite each configured native key to the spelling the service uses.
    ///
    /// ArcGIS field names are case-insensitive. An exact match in
    /// `native_keys` wins; otherwise the first ASCII case-insensitive match in
    /// `native_keys` order is taken. Keys with no match stay as configured.
    pub fn resolve<'a>(mut self, native_keys: impl IntoIterator<Item = &'a str>) -> Self {
        let keys: Vec<&str> = native_keys.into_iter().collect();
        for (_, native) in &mut self.entries {
            if keys.contains(&native.as_str()) {
                continue;
            }
            if let Some(found) = keys.iter().find(|k| k.eq_ignore_ascii_case(native)) {
                *native = (*found).to_string();
            }
        }
        self
    }

    /// Replace `feature`'s native properties with their canonical projection
    /// and stamp provenance.
    ///
    /// Canonical fields whose native key is absent or `null` are omitted.
    /// Lookups are exact; call [`Self::resolve`] first to adopt the service's
    /// spelling of each key.
    pub fn swizzle(&self, mut feature: CanonicalFeature, source_url: &str) -> CanonicalFeature {
        let native = std::mem::take(&mut feature.properties);
        let mut props = Map::with_capacity(self.entries.len() + 1);

        for (canonical, key) in &self.entries {
            match native.get(key) {
                Some(Value::Null) | None => {}
                Some(v) => {
                    props.insert((*canonical).to_string(), v.clone());
                }
            }
        }

        props.insert(PROVENANCE_KEY.to_string(), Value::String(source_url.to_string()));
        feature.properties = props;
        feature
    }
}

/// Map one feature with `source`'s field map.
///
/// Compiles and resolves the map on every call; pipelines do both once per
/// source and use [`CompiledFieldMap::swizzle`] instead.
pub fn swizzle(feature: CanonicalFeature, source: &SourceDescriptor) -> CanonicalFeature {
    let map = CompiledFieldMap::compile(&source.field_map)
        .resolve(feature.properties.keys().map(String::as_str));
    map.swizzle(feature, &source.url)
}

/// Whether a mapped feature carries nothing but provenance.
pub fn is_unmapped(feature: &CanonicalFeature) -> bool {
    feature.properties.keys().all(|k| k == PROVENANCE_KEY)
}
