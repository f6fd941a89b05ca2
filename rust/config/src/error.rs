use serde::ser::SerializeMap;

/// Errors raised while loading or validating a cluster specification.
///
/// Every variant is fatal: an invalid specification aborts the run
/// before any planning starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The cluster name is empty or contains path separators.
    #[error("invalid cluster name: {name:?}")]
    InvalidClusterName { name: String },

    /// The specification declares no hosts.
    #[error("specification declares no hosts")]
    NoHosts,

    /// Two hosts share the same name.
    #[error("duplicate host name: {name}")]
    DuplicateHost { name: String },

    /// A host declares a role the system does not know.
    #[error("host {host} has unknown role: {role}")]
    UnknownRole { host: String, role: String },

    /// A host declares no roles at all.
    #[error("host {host} has no roles")]
    NoRoles { host: String },

    /// No host carries a role the cluster cannot exist without.
    #[error("no host has role: {role}")]
    MissingRole { role: String },

    /// A host address is empty.
    #[error("host {host} has an empty address")]
    EmptyAddress { host: String },

    /// A CIDR field does not parse as `<ip>/<prefix>`.
    #[error("invalid CIDR in {field}: {value}")]
    InvalidCidr { field: String, value: String },

    /// A component version field does not parse as a semantic version.
    #[error("invalid version in {field}: {value}")]
    InvalidVersion { field: String, value: String },

    /// A port field is zero.
    #[error("invalid port in {field}: 0")]
    InvalidPort { field: String },

    /// The control-plane endpoint domain is empty.
    #[error("control plane endpoint has an empty domain")]
    EmptyEndpointDomain,

    /// An I/O error occurred while reading the document.
    #[error("io error: {message}")]
    Io { message: String },

    /// The document is not valid YAML for the schema.
    #[error("yaml error: {message}")]
    Yaml { message: String },
}

impl serde::Serialize for ConfigError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry("message", &self.to_string())?;
        map.end()
    }
}

/// A `Result` type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;
