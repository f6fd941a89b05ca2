use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{ConfigError, ConfigResult};
use crate::spec::{ClusterSpec, EtcdDeployment};

/// Role names a host may declare.
pub(crate) const KNOWN_ROLES: &[&str] = &["master", "worker", "etcd", "registry"];

/// Validate a parsed cluster specification.
///
/// Checks are ordered so the first structural problem is reported:
/// naming, host uniqueness, role sanity, role coverage, addresses,
/// CIDRs, versions, then ports.
///
/// # Errors
///
/// Returns the first [`ConfigError`] the document fails.
pub fn validate(spec: &ClusterSpec) -> ConfigResult<()> {
    if spec.cluster_name.is_empty() || spec.cluster_name.contains(['/', '\\']) {
        return Err(ConfigError::InvalidClusterName {
            name: spec.cluster_name.clone(),
        });
    }

    if spec.hosts.is_empty() {
        return Err(ConfigError::NoHosts);
    }

    let mut seen = HashSet::new();
    for host in &spec.hosts {
        if !seen.insert(host.name.as_str()) {
            return Err(ConfigError::DuplicateHost {
                name: host.name.clone(),
            });
        }
        if host.roles.is_empty() {
            return Err(ConfigError::NoRoles {
                host: host.name.clone(),
            });
        }
        for role in &host.roles {
            if !KNOWN_ROLES.contains(&role.as_str()) {
                return Err(ConfigError::UnknownRole {
                    host: host.name.clone(),
                    role: role.clone(),
                });
            }
        }
        if host.address.is_empty() {
            return Err(ConfigError::EmptyAddress {
                host: host.name.clone(),
            });
        }
        if host.port == 0 {
            return Err(ConfigError::InvalidPort {
                field: format!("hosts.{}.port", host.name),
            });
        }
    }

    if spec.hosts_with_role("master").is_empty() {
        return Err(ConfigError::MissingRole {
            role: "master".to_string(),
        });
    }
    // A managed etcd needs hosts to run on; external clusters do not.
    if spec.etcd.deployment == EtcdDeployment::Kubexm && spec.hosts_with_role("etcd").is_empty() {
        return Err(ConfigError::MissingRole {
            role: "etcd".to_string(),
        });
    }

    if spec.control_plane_endpoint.domain.is_empty() {
        return Err(ConfigError::EmptyEndpointDomain);
    }
    if spec.control_plane_endpoint.port == 0 {
        return Err(ConfigError::InvalidPort {
            field: "controlPlaneEndpoint.port".to_string(),
        });
    }

    check_cidr("network.podCIDR", &spec.network.pod_cidr)?;
    check_cidr("network.serviceCIDR", &spec.network.service_cidr)?;

    check_version("etcd.version", &spec.etcd.version)?;
    check_version("kubernetes.version", &spec.kubernetes.version)?;

    if spec.etcd.client_port == 0 {
        return Err(ConfigError::InvalidPort {
            field: "etcd.clientPort".to_string(),
        });
    }
    if spec.etcd.peer_port == 0 {
        return Err(ConfigError::InvalidPort {
            field: "etcd.peerPort".to_string(),
        });
    }

    Ok(())
}

/// Check that a string is `<ip>/<prefix>` with a prefix valid for the
/// address family.
fn check_cidr(field: &str, value: &str) -> ConfigResult<()> {
    let err = || ConfigError::InvalidCidr {
        field: field.to_string(),
        value: value.to_string(),
    };

    let (addr, prefix) = value.split_once('/').ok_or_else(err)?;
    let addr: IpAddr = addr.parse().map_err(|_| err())?;
    let prefix: u8 = prefix.parse().map_err(|_| err())?;
    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(err());
    }
    Ok(())
}

/// Check that a version string (with or without a leading `v`) parses
/// as a semantic version.
fn check_version(field: &str, value: &str) -> ConfigResult<()> {
    let stripped = value.strip_prefix('v').unwrap_or(value);
    semver::Version::parse(stripped).map_err(|_| ConfigError::InvalidVersion {
        field: field.to_string(),
        value: value.to_string(),
    })?;
    Ok(())
}
