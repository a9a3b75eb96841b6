use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_INPUT: &str = "vivo_grants.txt";
pub const DEFAULT_CONFIG_FILE: &str = "grant-ingest.yaml";
pub const DEFAULT_SPARQL_ENDPOINT: &str = "http://localhost:8080/vivo/api/sparqlQuery";
pub const DEFAULT_NAMESPACE: &str = "http://vivo.ufl.edu/individual/";

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub input: PathBuf,
    pub sparql_endpoint: String,
    pub vivo_email: Option<String>,
    pub vivo_password: Option<String>,
    /// JSON store snapshot used instead of the SPARQL endpoint.
    pub store_fixture: Option<PathBuf>,
    pub namespace: String,
    /// Fraction of keys processed; 1.0 disables sampling.
    pub sample_rate: f64,
    pub sample_seed: Option<u64>,
    pub delimiter: u8,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from(DEFAULT_INPUT),
            sparql_endpoint: DEFAULT_SPARQL_ENDPOINT.to_string(),
            vivo_email: None,
            vivo_password: None,
            store_fixture: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            sample_rate: 1.0,
            sample_seed: None,
            delimiter: grant_source::DEFAULT_DELIMITER,
            http_timeout_secs: 30,
            user_agent: format!("grant-ingest/{}", grant_core::INGEST_VERSION),
        }
    }
}

/// Keys accepted in the YAML config file; all optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    input: Option<PathBuf>,
    sparql_endpoint: Option<String>,
    vivo_email: Option<String>,
    vivo_password: Option<String>,
    store_fixture: Option<PathBuf>,
    namespace: Option<String>,
    sample_rate: Option<f64>,
    sample_seed: Option<u64>,
    delimiter: Option<String>,
    http_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl IngestConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults, then the YAML file, then environment variables.
    pub fn from_lookup(env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        let file = env("GRANT_INGEST_CONFIG")
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from(DEFAULT_CONFIG_FILE)).filter(|p| p.exists()));
        if let Some(path) = file {
            config.apply_file(&path)?;
        }

        if let Some(v) = env("VIVO_SPARQL_ENDPOINT") {
            config.sparql_endpoint = v;
        }
        if let Some(v) = env("VIVO_EMAIL") {
            config.vivo_email = Some(v);
        }
        if let Some(v) = env("VIVO_PASSWORD") {
            config.vivo_password = Some(v);
        }
        if let Some(v) = env("GRANT_INGEST_STORE_FIXTURE") {
            config.store_fixture = Some(PathBuf::from(v));
        }
        if let Some(v) = env("GRANT_INGEST_NAMESPACE") {
            config.namespace = v;
        }
        if let Some(v) = env("GRANT_INGEST_SAMPLE") {
            match v.trim().parse::<f64>().ok().filter(|r| valid_rate(*r)) {
                Some(rate) => config.sample_rate = rate,
                None => warn!(value = %v, "ignoring GRANT_INGEST_SAMPLE outside [0, 1]"),
            }
        }
        if let Some(v) = env("GRANT_INGEST_SAMPLE_SEED") {
            match v.trim().parse() {
                Ok(seed) => config.sample_seed = Some(seed),
                Err(_) => warn!(value = %v, "ignoring non-numeric GRANT_INGEST_SAMPLE_SEED"),
            }
        }
        if let Some(v) = env("GRANT_INGEST_DELIMITER") {
            match parse_delimiter(&v) {
                Some(d) => config.delimiter = d,
                None => warn!(value = %v, "ignoring GRANT_INGEST_DELIMITER, need one ASCII character"),
            }
        }
        if let Some(v) = env("GRANT_INGEST_HTTP_TIMEOUT_SECS") {
            match v.trim().parse() {
                Ok(secs) => config.http_timeout_secs = secs,
                Err(_) => warn!(value = %v, "ignoring non-numeric GRANT_INGEST_HTTP_TIMEOUT_SECS"),
            }
        }
        if let Some(v) = env("GRANT_INGEST_USER_AGENT") {
            config.user_agent = v;
        }

        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let file: FileConfig = if text.trim().is_empty() {
            FileConfig::default()
        } else {
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        };

        if let Some(v) = file.input {
            self.input = v;
        }
        if let Some(v) = file.sparql_endpoint {
            self.sparql_endpoint = v;
        }
        if file.vivo_email.is_some() {
            self.vivo_email = file.vivo_email;
        }
        if file.vivo_password.is_some() {
            self.vivo_password = file.vivo_password;
        }
        if file.store_fixture.is_some() {
            self.store_fixture = file.store_fixture;
        }
        if let Some(v) = file.namespace {
            self.namespace = v;
        }
        if let Some(rate) = file.sample_rate {
            if valid_rate(rate) {
                self.sample_rate = rate;
            } else {
                warn!(rate, path = %path.display(), "ignoring sample_rate outside [0, 1]");
            }
        }
        if file.sample_seed.is_some() {
            self.sample_seed = file.sample_seed;
        }
        if let Some(v) = file.delimiter {
            match parse_delimiter(&v) {
                Some(d) => self.delimiter = d,
                None => warn!(value = %v, path = %path.display(), "ignoring delimiter, need one ASCII character"),
            }
        }
        if let Some(v) = file.http_timeout_secs {
            self.http_timeout_secs = v;
        }
        if let Some(v) = file.user_agent {
            self.user_agent = v;
        }
        Ok(())
    }

    pub fn with_input(mut self, input: impl Into<PathBuf>) -> Self {
        self.input = input.into();
        self
    }

    pub fn sampling_enabled(&self) -> bool {
        self.sample_rate < 1.0
    }
}

fn valid_rate(rate: f64) -> bool {
    (0.0..=1.0).contains(&rate)
}

fn parse_delimiter(raw: &str) -> Option<u8> {
    match raw.as_bytes() {
        [b] if b.is_ascii() => Some(*b),
        _ if raw == "\\t" => Some(b'\t'),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn explicit_config_file_must_exist() {
        let config = IngestConfig::from_lookup(lookup(&[(
            "GRANT_INGEST_CONFIG",
            "/definitely/not/here.yaml",
        )]));
        assert!(config.is_err());
    }

    #[test]
    fn defaults_match_the_export_conventions() {
        let config = IngestConfig::default();
        assert_eq!(config.input, PathBuf::from("vivo_grants.txt"));
        assert_eq!(config.delimiter, b'|');
        assert_eq!(config.sample_rate, 1.0);
        assert!(!config.sampling_enabled());
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(
            file,
            "namespace: http://file.example.edu/individual/\nsample_rate: 0.5\ndelimiter: \",\"\nstore_fixture: fixtures/store.json"
        )
        .unwrap();
        let path = file.path().to_string_lossy().to_string();

        let config = IngestConfig::from_lookup(lookup(&[
            ("GRANT_INGEST_CONFIG", path.as_str()),
            ("GRANT_INGEST_NAMESPACE", "http://env.example.edu/individual/"),
            ("VIVO_EMAIL", "vivo_root@example.edu"),
        ]))
        .unwrap();

        assert_eq!(config.namespace, "http://env.example.edu/individual/");
        assert_eq!(config.sample_rate, 0.5);
        assert!(config.sampling_enabled());
        assert_eq!(config.delimiter, b',');
        assert_eq!(config.store_fixture, Some(PathBuf::from("fixtures/store.json")));
        assert_eq!(config.vivo_email.as_deref(), Some("vivo_root@example.edu"));
        assert!(config.vivo_password.is_none());
    }

    #[test]
    fn invalid_environment_values_fall_back() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file).unwrap();
        let path = file.path().to_string_lossy().to_string();
        let config = IngestConfig::from_lookup(lookup(&[
            ("GRANT_INGEST_CONFIG", path.as_str()),
            ("GRANT_INGEST_SAMPLE", "1.5"),
            ("GRANT_INGEST_DELIMITER", "||"),
            ("GRANT_INGEST_HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap();
        assert_eq!(config.sample_rate, 1.0);
        assert_eq!(config.delimiter, b'|');
        assert_eq!(config.http_timeout_secs, 30);
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "sample: 0.2").unwrap();
        let path = file.path().to_string_lossy().to_string();
        let err = IngestConfig::from_lookup(lookup(&[("GRANT_INGEST_CONFIG", path.as_str())])).unwrap_err();
        assert!(err.to_string().starts_with("parsing "));
    }

    #[test]
    fn tab_delimiter_can_be_spelled_out() {
        assert_eq!(parse_delimiter("\\t"), Some(b'\t'));
        assert_eq!(parse_delimiter("|"), Some(b'|'));
        assert_eq!(parse_delimiter("é"), None);
    }
}
