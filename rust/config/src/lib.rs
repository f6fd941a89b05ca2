//! Declarative cluster specification: schema, defaults, loading, and
//! load-time validation.
//!
//! The specification document is the read-only input to every pipeline.
//! It is loaded once, validated once, and never mutated afterwards;
//! planning and execution treat it as immutable shared data.

pub mod defaults;
mod error;
mod spec;
mod validate;

use std::path::Path;

pub use error::{ConfigError, ConfigResult};
pub use spec::{
    ClusterSpec, ControlPlaneEndpoint, CriSocket, EtcdDeployment, EtcdSpec, HostSpec,
    KubernetesSpec, LocalRegistrySpec, NetworkPlugin, NetworkSpec, RegistrySpec,
};
pub use validate::validate;

/// Load and validate a cluster specification from a YAML file.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read,
/// [`ConfigError::Yaml`] if it cannot be parsed, or any validation
/// error the document fails.
pub fn load(path: impl AsRef<Path>) -> ConfigResult<ClusterSpec> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
        message: format!("{}: {e}", path.as_ref().display()),
    })?;
    from_yaml(&content)
}

/// Parse and validate a cluster specification from a YAML string.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] on parse failure or any validation
/// error the document fails.
pub fn from_yaml(content: &str) -> ConfigResult<ClusterSpec> {
    let spec: ClusterSpec = serde_yaml::from_str(content).map_err(|e| ConfigError::Yaml {
        message: e.to_string(),
    })?;
    validate(&spec)?;
    Ok(spec)
}
