use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use kubexm_config::HostSpec;

use crate::{HostError, HostResult};

/// CPU architecture of a host.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Arch {
    #[default]
    Amd64,
    Arm64,
}

/// A role a host plays in the cluster.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Master,
    Worker,
    Etcd,
    Registry,
}

/// Operating system facts recorded on first contact with a host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OsFacts {
    /// Distribution identifier, e.g. `ubuntu`.
    pub os_id: String,
    /// Distribution version, e.g. `22.04`.
    pub os_version: String,
    /// Kernel release from `uname -r`.
    pub kernel: String,
    /// Hostname as the machine reports it.
    pub hostname: String,
}

/// A reachable machine, alive for the whole run.
///
/// Identity is the name; everything else is addressing detail. OS facts
/// start empty and are recorded once by the preflight recipes.
#[derive(Debug)]
pub struct Host {
    name: String,
    address: String,
    internal_address: String,
    port: u16,
    user: String,
    arch: Arch,
    roles: Vec<Role>,
    /// The machine running the orchestrator itself.
    is_control_node: bool,
    facts: RwLock<Option<OsFacts>>,
}

impl Host {
    /// Build a host from its specification entry.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::UnknownArch`] or [`HostError::UnknownRole`]
    /// when the specification carries names the system does not know.
    pub fn from_spec(spec: &HostSpec) -> HostResult<Self> {
        let arch = spec.arch.parse().map_err(|_| HostError::UnknownArch {
            host: spec.name.clone(),
            arch: spec.arch.clone(),
        })?;
        let roles = spec
            .roles
            .iter()
            .map(|r| {
                r.parse().map_err(|_| HostError::UnknownRole {
                    host: spec.name.clone(),
                    role: r.clone(),
                })
            })
            .collect::<HostResult<Vec<Role>>>()?;

        Ok(Self {
            name: spec.name.clone(),
            address: spec.address.clone(),
            internal_address: spec
                .internal_address
                .clone()
                .unwrap_or_else(|| spec.address.clone()),
            port: spec.port,
            user: spec.user.clone(),
            arch,
            roles,
            is_control_node: false,
            facts: RwLock::new(None),
        })
    }

    /// The distinguished host representing the orchestrator machine.
    ///
    /// Targets of local-only steps (downloads, PKI generation). It
    /// carries no cluster roles.
    #[must_use]
    pub fn control_node() -> Self {
        Self {
            name: "localhost".to_string(),
            address: "127.0.0.1".to_string(),
            internal_address: "127.0.0.1".to_string(),
            port: 0,
            user: String::new(),
            arch: Arch::default(),
            roles: Vec::new(),
            is_control_node: true,
            facts: RwLock::new(None),
        }
    }

    /// Stable unique name; host identity.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the orchestrator reaches the host at.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Address other cluster members reach the host at.
    #[must_use]
    pub fn internal_address(&self) -> &str {
        &self.internal_address
    }

    /// SSH port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// SSH user.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// CPU architecture.
    #[must_use]
    pub fn arch(&self) -> Arch {
        self.arch
    }

    /// Roles this host carries.
    #[must_use]
    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Whether this host carries the given role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether this is the orchestrator machine.
    #[must_use]
    pub fn is_control_node(&self) -> bool {
        self.is_control_node
    }

    /// A clone of the recorded OS facts, if any were recorded yet.
    #[must_use]
    pub fn facts(&self) -> Option<OsFacts> {
        self.facts
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Record OS facts for this host, replacing any previous record.
    pub fn record_facts(&self, facts: OsFacts) {
        let mut slot = self
            .facts
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *slot = Some(facts);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Host {}

impl std::hash::Hash for Host {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}
