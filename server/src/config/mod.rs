use anyhow::{anyhow, Context};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_SERVICES_CONFIG: &str = "server/config/services.toml";

/// Bootstrap file named by `SERVICES_CONFIG`, or the default location.
pub fn services_config_path() -> PathBuf {
    std::env::var("SERVICES_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_SERVICES_CONFIG))
}

/// Settings of an `api::http` service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Name of the store service; must also appear in `depends_on`.
    pub store: String,
    pub session_ttl_secs: Option<u64>,
    #[serde(default = "default_timeout_ms")]
    pub store_timeout_ms: u64,
    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,
    pub rate_limit: Option<RateLimitSettings>,
    pub tls: Option<TlsSettings>,
}

impl ApiSettings {
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSettings {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
        }
    }
}

impl RateLimitSettings {
    /// Both the budget and the window must be non-zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_requests == 0 {
            return Err("rate_limit.max_requests must be at least 1".to_string());
        }
        if self.window_secs == 0 {
            return Err("rate_limit.window_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsSettings {
    pub cert: PathBuf,
    pub key: PathBuf,
    /// CA bundles trusted by HTTP clients of this service. The listener ignores it.
    #[serde(default, rename = "certifyingAuthorities")]
    pub certifying_authorities: Vec<PathBuf>,
}

impl TlsSettings {
    pub fn server_config(&self) -> anyhow::Result<rustls::ServerConfig> {
        let certs = rustls_pemfile::certs(&mut open(&self.cert)?)
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid certificate in '{}'", self.cert.display()))?;
        if certs.is_empty() {
            return Err(anyhow!("no certificate found in '{}'", self.cert.display()));
        }

        let key = rustls_pemfile::private_key(&mut open(&self.key)?)
            .with_context(|| format!("invalid private key in '{}'", self.key.display()))?
            .ok_or_else(|| anyhow!("no private key found in '{}'", self.key.display()))?;

        let config = rustls::ServerConfig::builder_with_provider(Arc::new(
            rustls::crypto::ring::default_provider(),
        ))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

        Ok(config)
    }
}

fn open(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path).with_context(|| format!("cannot open '{}'", path.display()))?;
    Ok(BufReader::new(file))
}

/// Settings of a `store::mongo` service.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoStoreSettings {
    #[serde(default = "default_mongo_uri")]
    pub uri: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl MongoStoreSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_max_requests() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

fn default_mongo_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database() -> String {
    "identity".to_string()
}

fn default_collection() -> String {
    "accounts".to_string()
}
