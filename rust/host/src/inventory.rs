use std::sync::Arc;

use indexmap::IndexMap;

use kubexm_config::ClusterSpec;

use crate::{Host, HostError, HostResult, Role};

/// The full set of hosts for a run, indexed by name, plus the
/// distinguished control node.
///
/// Built once from the cluster specification when a pipeline starts
/// and immutable afterwards. Hosts are shared by reference: nodes in
/// the execution graph hold `Arc<Host>` clones of these entries.
#[derive(Debug, Clone)]
pub struct Inventory {
    hosts: IndexMap<String, Arc<Host>>,
    control_node: Arc<Host>,
}

impl Inventory {
    /// Build the inventory from a validated cluster specification.
    ///
    /// # Errors
    ///
    /// Returns a [`HostError`] if a host entry cannot be built or two
    /// entries share a name.
    pub fn from_spec(spec: &ClusterSpec) -> HostResult<Self> {
        let mut hosts = IndexMap::with_capacity(spec.hosts.len());
        for host_spec in &spec.hosts {
            let host = Host::from_spec(host_spec)?;
            if hosts
                .insert(host_spec.name.clone(), Arc::new(host))
                .is_some()
            {
                return Err(HostError::DuplicateHost {
                    name: host_spec.name.clone(),
                });
            }
        }
        Ok(Self {
            hosts,
            control_node: Arc::new(Host::control_node()),
        })
    }

    /// Number of cluster hosts (the control node is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the inventory has no cluster hosts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Look up a host by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Host>> {
        self.hosts.get(name).cloned()
    }

    /// Look up a host by name, failing when absent.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NotFound`] when no host has the name.
    pub fn require(&self, name: &str) -> HostResult<Arc<Host>> {
        self.get(name).ok_or_else(|| HostError::NotFound {
            name: name.to_string(),
        })
    }

    /// All cluster hosts in declaration order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<Host>> {
        self.hosts.values().cloned().collect()
    }

    /// All hosts carrying the given role, in declaration order.
    #[must_use]
    pub fn with_role(&self, role: Role) -> Vec<Arc<Host>> {
        self.hosts
            .values()
            .filter(|h| h.has_role(role))
            .cloned()
            .collect()
    }

    /// Whether any host carries the given role.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.hosts.values().any(|h| h.has_role(role))
    }

    /// The first host carrying the given role, in declaration order.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NoHostForRole`] when the role is absent.
    pub fn first_with_role(&self, role: Role) -> HostResult<Arc<Host>> {
        self.with_role(role)
            .into_iter()
            .next()
            .ok_or(HostError::NoHostForRole { role })
    }

    /// The distinguished host representing the orchestrator machine.
    #[must_use]
    pub fn control_node(&self) -> Arc<Host> {
        Arc::clone(&self.control_node)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn inventory() -> Inventory {
        let spec = kubexm_config::from_yaml(
            r"
clusterName: test
hosts:
  - name: cp-1
    address: 10.0.0.1
    roles: [master, etcd]
  - name: cp-2
    address: 10.0.0.2
    roles: [master, etcd]
  - name: w-1
    address: 10.0.0.3
    roles: [worker]
",
        )
        .expect("valid spec");
        Inventory::from_spec(&spec).expect("valid inventory")
    }

    #[test]
    fn role_index_preserves_declaration_order() {
        let inv = inventory();
        let masters: Vec<String> = inv
            .with_role(Role::Master)
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(masters, vec!["cp-1".to_string(), "cp-2".to_string()]);
        assert_eq!(
            inv.first_with_role(Role::Master).expect("master").name(),
            "cp-1"
        );
    }

    #[test]
    fn missing_role_is_an_error() {
        let inv = inventory();
        assert_eq!(
            inv.first_with_role(Role::Registry),
            Err(HostError::NoHostForRole {
                role: Role::Registry
            })
        );
        assert!(!inv.has_role(Role::Registry));
    }

    #[test]
    fn lookup_by_name() {
        let inv = inventory();
        assert!(inv.get("w-1").is_some());
        assert_eq!(
            inv.require("w-9"),
            Err(HostError::NotFound {
                name: "w-9".to_string()
            })
        );
    }
}
