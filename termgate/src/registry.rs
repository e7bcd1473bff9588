//! Target registry: the static map from logical target identifiers to
//! SSH connection parameters.
//!
//! The registry is loaded once at startup from a TOML file and never
//! mutated afterwards. Lookups by unknown identifier fail with an error
//! that names the available targets, so clients get an actionable message
//! instead of a bare rejection.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::ConfigError;

/// Connection parameters for one remote host.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetDescriptor {
    /// Logical identifier, unique within the registry.
    pub id: String,

    /// Hostname or IP address.
    pub host: String,

    /// SSH port (default: 22).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication.
    pub username: String,

    /// Path to the private key file.
    pub key_path: PathBuf,

    /// Optional human-readable name for diagnostics.
    #[serde(default)]
    pub display_name: Option<String>,
}

fn default_port() -> u16 {
    22
}

/// Top-level shape of the targets file.
#[derive(Debug, Deserialize)]
struct TargetsFile {
    #[serde(default)]
    targets: Vec<TargetDescriptor>,
}

/// Immutable registry of known targets, in declaration order.
#[derive(Debug, Default)]
pub struct TargetRegistry {
    targets: IndexMap<String, TargetDescriptor>,
}

impl TargetRegistry {
    /// Build a registry from descriptors, rejecting duplicate identifiers.
    pub fn new(
        descriptors: impl IntoIterator<Item = TargetDescriptor>,
    ) -> std::result::Result<Self, ConfigError> {
        let mut targets = IndexMap::new();
        for descriptor in descriptors {
            let id = descriptor.id.clone();
            if targets.insert(id.clone(), descriptor).is_some() {
                return Err(ConfigError::DuplicateTarget(id));
            }
        }
        Ok(Self { targets })
    }

    /// Load a registry from a TOML targets file.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Parse a registry from TOML text.
    pub fn from_toml_str(raw: &str) -> std::result::Result<Self, ConfigError> {
        let file: TargetsFile = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: PathBuf::new(),
            source,
        })?;
        Self::new(file.targets)
    }

    /// Look up a target by identifier.
    ///
    /// Fails with [`ConfigError::UnknownTarget`] carrying the list of
    /// available identifiers.
    pub fn lookup(&self, id: &str) -> std::result::Result<&TargetDescriptor, ConfigError> {
        self.targets
            .get(id)
            .ok_or_else(|| ConfigError::UnknownTarget {
                id: id.to_string(),
                available: self.identifiers().join(", "),
            })
    }

    /// Known target identifiers in declaration order.
    pub fn identifiers(&self) -> Vec<String> {
        self.targets.keys().cloned().collect()
    }

    /// Number of configured targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry has no targets at all.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Check every target for configuration problems.
    ///
    /// Warnings are informational only. A target with a placeholder host or
    /// a missing key file stays in the registry and simply fails at connect
    /// time.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for (id, target) in &self.targets {
            if target.host.is_empty() || target.host.contains('<') {
                warnings.push(format!("{id}: host not configured (still placeholder)"));
            }
            if target.username.is_empty() {
                warnings.push(format!("{id}: username not set"));
            }
            if target.key_path.as_os_str().is_empty() {
                warnings.push(format!("{id}: private key path not set"));
            } else if !target.key_path.exists() {
                warnings.push(format!(
                    "{id}: private key not found at {}",
                    target.key_path.display()
                ));
            }
        }
        warnings
    }
}
