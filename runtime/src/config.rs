//! Runtime configuration: the source catalog plus fetch and output settings.
//!
//! Configuration is JSON with camelCase keys. Lookup order:
//! 1. an explicit path (`--config`)
//! 2. `NAD_CONFIG`
//! 3. `./nad.json`
//! 4. `~/.nad/config.json`
//!
//! `NAD_TTL`, `NAD_BIND` and `NAD_MAX_CONCURRENT` override the file.

use crate::acquisition::http_client::DEFAULT_USER_AGENT;
use crate::error::ConfigError;
use crate::normalize::field_map::CanonicalField;
use crate::pipeline::aggregator::CollectionMetadata;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One upstream feature service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDescriptor {
    /// FeatureServer URL (without the layer index).
    pub url: String,
    /// Canonical field -> source-native attribute name.
    #[serde(alias = "map")]
    pub field_map: BTreeMap<CanonicalField, String>,
    /// Layer index within the service.
    #[serde(default)]
    pub layer: u32,
    /// Label used in logs and reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Credential passed through as the `token` query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Page size cap below the service's `maxRecordCount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,
}

impl SourceDescriptor {
    /// Source on layer 0 with no label, token or page size override.
    pub fn new(url: impl Into<String>, field_map: BTreeMap<CanonicalField, String>) -> Self {
        Self {
            url: url.into(),
            field_map,
            layer: 0,
            name: None,
            token: None,
            page_size: None,
        }
    }

    /// Name for logs: the configured label or the URL.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.url)
    }

    /// `{url}/{layer}`
    pub fn layer_url(&self) -> String {
        format!("{}/{}", self.url.trim_end_matches('/'), self.layer)
    }

    /// `{url}/{layer}/query`
    pub fn query_url(&self) -> String {
        format!("{}/query", self.layer_url())
    }
}

/// Upstream request behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchSettings {
    /// Deadline for each probe or page request.
    pub request_timeout_ms: u64,
    /// In-flight request cap shared by all sources of a run.
    pub max_concurrent_requests: usize,
    /// Minimum spacing between request starts.
    pub min_delay_ms: u64,
    /// Extra attempts for a failed page (probes are not retried).
    pub max_retries: u32,
    /// First backoff step; doubles per attempt.
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
    /// Headers added to every upstream request.
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_concurrent_requests: 8,
            min_delay_ms: 0,
            max_retries: 2,
            retry_base_delay_ms: 250,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            headers: BTreeMap::new(),
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NadConfig {
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    /// Freshness hint in seconds attached to every result.
    #[serde(default = "default_ttl")]
    pub ttl: u64,
    #[serde(default)]
    pub metadata: CollectionMetadata,
    #[serde(default)]
    pub fetch: FetchSettings,
    /// Drop features that carry only the provenance key.
    #[serde(default)]
    pub drop_unmapped: bool,
    /// Listen address for `nad serve`.
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_ttl() -> u64 {
    60
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for NadConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            ttl: default_ttl(),
            metadata: CollectionMetadata::default(),
            fetch: FetchSettings::default(),
            drop_unmapped: false,
            bind: default_bind(),
        }
    }
}

impl NadConfig {
    /// Find the configuration file to use (see the module docs for the order).
    pub fn locate(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        resolve_path(explicit, std::env::var("NAD_CONFIG").ok())
    }

    /// Locate, read, override from the environment and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::locate(explicit)?;
        let mut config = Self::from_file(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a configuration file without environment overrides.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `NAD_*` overrides using `lookup` for variable access.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(ttl) = lookup("NAD_TTL") {
            self.ttl = ttl
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("NAD_TTL is not a number: {ttl}")))?;
        }
        if let Some(bind) = lookup("NAD_BIND") {
            self.bind = bind;
        }
        if let Some(max) = lookup("NAD_MAX_CONCURRENT") {
            self.fetch.max_concurrent_requests = max.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("NAD_MAX_CONCURRENT is not a number: {max}"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 {
            return Err(ConfigError::Invalid("ttl must be positive".into()));
        }
        if self.fetch.max_concurrent_requests == 0 {
            return Err(ConfigError::Invalid(
                "fetch.maxConcurrentRequests must be at least 1".into(),
            ));
        }
        if self.fetch.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "fetch.requestTimeoutMs must be positive".into(),
            ));
        }
        for (i, source) in self.sources.iter().enumerate() {
            let parsed = url::Url::parse(&source.url).map_err(|e| {
                ConfigError::Invalid(format!("sources[{i}].url {:?}: {e}", source.url))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::Invalid(format!(
                    "sources[{i}].url must be http(s): {}",
                    source.url
                )));
            }
            if source.page_size == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "sources[{i}].pageSize must be positive"
                )));
            }
        }
        Ok(())
    }
}

/// Pick the first configuration file that exists.
fn resolve_path(explicit: Option<&Path>, env_path: Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    if let Some(path) = env_path {
        return Ok(PathBuf::from(path));
    }

    let mut candidates = vec![PathBuf::from("nad.json")];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".nad").join("config.json"));
    }

    candidates
        .iter()
        .find(|p| p.is_file())
        .cloned()
        .ok_or_else(|| ConfigError::NotFound {
            tried: candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const DURHAM: &str = r#"{
        "sources": [{
            "url": "https://services.arcgis.com/hRUr1F8lE8Jq2uJo/arcgis/rest/services/DURHAM_COUNTY_WITH_FLDS/FeatureServer",
            "fieldMap": {"state": "State", "county": "County", "addressNumber": "HOUSENUM"}
        }]
    }"#;

    #[test]
    fn test_defaults() {
        let config: NadConfig = serde_json::from_str(DURHAM).unwrap();
        assert_eq!(config.ttl, 60);
        assert_eq!(config.metadata.name, "Nationwide Address Dataset");
        assert_eq!(config.fetch.max_concurrent_requests, 8);
        assert!(!config.drop_unmapped);
        assert_eq!(config.sources[0].layer, 0);
        assert_eq!(
            config.sources[0].field_map[&CanonicalField::AddressNumber],
            "HOUSENUM"
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_legacy_map_alias() {
        let config: NadConfig = serde_json::from_str(
            r#"{"sources": [{"url": "https://example.com/FeatureServer", "map": {"zipCode": "ZIPCODE"}}]}"#,
        )
        .unwrap();
        assert_eq!(config.sources[0].field_map[&CanonicalField::ZipCode], "ZIPCODE");
    }

    #[test]
    fn test_unknown_canonical_field_is_rejected() {
        let result: Result<NadConfig, _> = serde_json::from_str(
            r#"{"sources": [{"url": "https://example.com/FeatureServer", "fieldMap": {"roofColor": "ROOF"}}]}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = NadConfig::default();
        config.ttl = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = NadConfig::default();
        config
            .sources
            .push(SourceDescriptor::new("ftp://example.com/FeatureServer", BTreeMap::new()));
        assert!(config.validate().is_err());

        let mut config = NadConfig::default();
        config.sources.push(SourceDescriptor::new("not a url", BTreeMap::new()));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> =
            HashMap::from([("NAD_TTL", "300"), ("NAD_BIND", "0.0.0.0:9000"), ("NAD_MAX_CONCURRENT", "3")]);
        let mut config = NadConfig::default();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.ttl, 300);
        assert_eq!(config.bind, "0.0.0.0:9000");
        assert_eq!(config.fetch.max_concurrent_requests, 3);

        let err = config
            .apply_overrides(|k| (k == "NAD_TTL").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("NAD_TTL"));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DURHAM.as_bytes()).unwrap();

        let config = NadConfig::from_file(file.path()).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(
            config.sources[0].layer_url(),
            "https://services.arcgis.com/hRUr1F8lE8Jq2uJo/arcgis/rest/services/DURHAM_COUNTY_WITH_FLDS/FeatureServer/0"
        );
    }

    #[test]
    fn test_from_file_errors() {
        let missing = NadConfig::from_file(Path::new("/nonexistent/nad.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::Read { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();
        let bad = NadConfig::from_file(file.path()).unwrap_err();
        assert!(matches!(bad, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_resolve_path_prefers_explicit_then_env() {
        let explicit = resolve_path(Some(Path::new("/etc/nad.json")), Some("/env/nad.json".into()));
        assert_eq!(explicit.unwrap(), PathBuf::from("/etc/nad.json"));

        let env = resolve_path(None, Some("/env/nad.json".into()));
        assert_eq!(env.unwrap(), PathBuf::from("/env/nad.json"));
    }

    #[test]
    fn test_query_url_trims_trailing_slash() {
        let mut source = SourceDescriptor::new("https://example.com/FeatureServer/", BTreeMap::new());
        source.layer = 2;
        assert_eq!(source.query_url(), "https://example.com/FeatureServer/2/query");
        assert_eq!(source.label(), "https://example.com/FeatureServer/");
    }
}
