use std::path::PathBuf;
use std::str::FromStr;

/// Server settings, read once from `WEEKSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub password: String,
    pub max_connections: usize,
    /// WAL appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub tls_cert: Option<PathBuf>,
    pub tls_key: Option<PathBuf>,
    pub metrics_port: Option<u16>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            data_dir: PathBuf::from("./data"),
            password: "weekslot".into(),
            max_connections: 256,
            compact_threshold: 1000,
            tls_cert: None,
            tls_key: None,
            metrics_port: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable numbers fall back to the default, like unset ones.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            bind: lookup("WEEKSLOT_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "WEEKSLOT_PORT").unwrap_or(defaults.port),
            data_dir: lookup("WEEKSLOT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            password: lookup("WEEKSLOT_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse_var(&lookup, "WEEKSLOT_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            compact_threshold: parse_var(&lookup, "WEEKSLOT_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
            tls_cert: lookup("WEEKSLOT_TLS_CERT").map(PathBuf::from),
            tls_key: lookup("WEEKSLOT_TLS_KEY").map(PathBuf::from),
            metrics_port: parse_var(&lookup, "WEEKSLOT_METRICS_PORT"),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}
