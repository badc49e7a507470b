//! Configuration management for the ontology client
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (ontology.toml)
//! - Environment variables (ONTOLOGY__*)
//!
//! ## Example config file (ontology.toml):
//! ```toml
//! [transport]
//! max_message_bytes = 4194304
//! flush_fraction = 0.9
//!
//! [registry]
//! builtins = true
//! definitions = ["./ontologies"]
//!
//! [logging]
//! filter = "ontology_client=debug"
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{OntologyError, Result};
use crate::registry::OntologyRegistry;
use crate::writer::{WriterConfig, DEFAULT_FLUSH_FRACTION, DEFAULT_MAX_MESSAGE_BYTES};

/// Main configuration for the ontology client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Transport sizing
    #[serde(default)]
    pub transport: TransportConfig,

    /// Registry population
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Log filtering
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Hard per-message ceiling in bytes
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Share of the ceiling at which writers flush
    #[serde(default = "default_flush_fraction")]
    pub flush_fraction: f64,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Register the built-in sensor ontologies
    #[serde(default = "default_true")]
    pub builtins: bool,

    /// Definition files or directories to load at startup
    #[serde(default)]
    pub definitions: Vec<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_filter")]
    pub filter: String,
}

// Default value functions
fn default_max_message_bytes() -> usize {
    DEFAULT_MAX_MESSAGE_BYTES
}

fn default_flush_fraction() -> f64 {
    DEFAULT_FLUSH_FRACTION
}

fn default_true() -> bool {
    true
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
            flush_fraction: default_flush_fraction(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            builtins: true,
            definitions: Vec::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

impl TransportConfig {
    /// Writer sizing derived from this section
    pub fn writer_config(&self) -> WriterConfig {
        WriterConfig {
            max_message_bytes: self.max_message_bytes,
            flush_fraction: self.flush_fraction,
        }
    }
}

/// Per-user config file, e.g. `~/.config/ontology-client/ontology.toml` on Linux
pub fn user_config_file() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "ontology-client", "ontology-client")
        .map(|dirs| dirs.config_dir().join("ontology.toml"))
}

impl ClientConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, adding a specific file on top of the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        // Load from default locations
        let config_locations = ["ontology.toml", ".ontology.toml", "config/ontology.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // Load from XDG config directory
        if let Some(xdg_config) = user_config_file() {
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        // Load from specified path
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Load from environment variables (ONTOLOGY__TRANSPORT__MAX_MESSAGE_BYTES, ...)
        builder = builder.add_source(
            Environment::with_prefix("ONTOLOGY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            OntologyError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build a registry from the `[registry]` section
    pub fn build_registry(&self) -> Result<OntologyRegistry> {
        let registry = if self.registry.builtins {
            OntologyRegistry::with_builtins()?
        } else {
            OntologyRegistry::new()
        };
        crate::definitions::register_paths(&registry, &self.registry.definitions)?;
        Ok(registry)
    }

    pub fn writer_config(&self) -> WriterConfig {
        self.transport.writer_config()
    }
}
