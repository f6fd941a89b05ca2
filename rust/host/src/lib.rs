//! Host abstraction and inventory: who the machines are, what roles
//! they carry, and how to query them.
//!
//! Hosts are created from the cluster specification when a pipeline
//! starts and live, immutable apart from lazily recorded OS facts, for
//! the whole run. Identity is the host name.

mod host;
mod inventory;

pub use host::{Arch, Host, OsFacts, Role};
pub use inventory::Inventory;

/// Errors raised while building or querying the inventory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// A host declares an architecture the system does not know.
    #[error("host {host} has unknown architecture: {arch}")]
    UnknownArch { host: String, arch: String },

    /// A host declares a role the system does not know.
    #[error("host {host} has unknown role: {role}")]
    UnknownRole { host: String, role: String },

    /// Two hosts share the same name.
    #[error("duplicate host name: {name}")]
    DuplicateHost { name: String },

    /// A host name is not present in the inventory.
    #[error("host not found: {name}")]
    NotFound { name: String },

    /// No host carries the requested role.
    #[error("no host has role: {role}")]
    NoHostForRole { role: Role },
}

/// A `Result` type alias using [`HostError`].
pub type HostResult<T> = Result<T, HostError>;
