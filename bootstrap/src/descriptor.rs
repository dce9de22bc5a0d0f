//! Declarative service descriptors and the bootstrap file that carries them.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ServiceError;

/// Names the factory that builds a service handler.
///
/// Resolved against a [`HandlerRegistry`](crate::HandlerRegistry) populated at
/// process start, never loaded dynamically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
pub struct HandlerRef {
    pub module: String,
    pub constructor: String,
}

impl HandlerRef {
    pub fn new(module: impl Into<String>, constructor: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            constructor: constructor.into(),
        }
    }
}

impl fmt::Display for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.constructor)
    }
}

/// One named service: its handler, declared dependencies and opaque settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDescriptor {
    pub name: String,
    pub handler: HandlerRef,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub config: toml::Table,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<String>, handler: HandlerRef) -> Self {
        Self {
            name: name.into(),
            handler,
            depends_on: Vec::new(),
            config: toml::Table::new(),
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    /// Decodes the configuration payload into a handler's typed settings.
    pub fn settings<T: DeserializeOwned>(&self) -> Result<T, ServiceError> {
        toml::Value::Table(self.config.clone())
            .try_into()
            .map_err(|e| ServiceError::Config(format!("service `{}`: {}", self.name, e)))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BootstrapSettings {
    pub phase_timeout_ms: Option<u64>,
}

/// Contents of a bootstrap file: global settings plus services in declaration order.
#[derive(Debug, Clone, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub bootstrap: BootstrapSettings,
    #[serde(default)]
    pub services: Vec<ServiceDescriptor>,
}

impl ServicesConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ServiceError::Config(format!(
                "Failed to read services file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ServiceError> {
        toml::from_str(content)
            .map_err(|e| ServiceError::Config(format!("Failed to parse services file: {}", e)))
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.bootstrap.phase_timeout_ms.map(Duration::from_millis)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }
}
