use serde::{Deserialize, Serialize};

use crate::defaults;

/// The declarative cluster specification.
///
/// Field names follow the document schema (camelCase). All optional
/// sections default to sensible values so a minimal document only needs
/// a cluster name and a host list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClusterSpec {
    /// Unique cluster name; also names the work-directory.
    pub cluster_name: String,

    /// Stable address the API server is reached at.
    #[serde(default)]
    pub control_plane_endpoint: ControlPlaneEndpoint,

    /// Etcd deployment parameters.
    #[serde(default)]
    pub etcd: EtcdSpec,

    /// Kubernetes component parameters.
    #[serde(default)]
    pub kubernetes: KubernetesSpec,

    /// Pod and service networking.
    #[serde(default)]
    pub network: NetworkSpec,

    /// Image registry configuration.
    #[serde(default)]
    pub registry: RegistrySpec,

    /// The machines forming the cluster.
    pub hosts: Vec<HostSpec>,
}

impl ClusterSpec {
    /// All host specs carrying the given role name.
    #[must_use]
    pub fn hosts_with_role(&self, role: &str) -> Vec<&HostSpec> {
        self.hosts
            .iter()
            .filter(|h| h.roles.iter().any(|r| r == role))
            .collect()
    }
}

/// The stable control-plane address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ControlPlaneEndpoint {
    /// Domain or address the API server is reached at.
    pub domain: String,
    /// API server port.
    #[serde(default = "default_api_server_port")]
    pub port: u16,
}

impl Default for ControlPlaneEndpoint {
    fn default() -> Self {
        Self {
            domain: "lb.kubexm.local".to_string(),
            port: defaults::API_SERVER_PORT,
        }
    }
}

fn default_api_server_port() -> u16 {
    defaults::API_SERVER_PORT
}

/// How etcd is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EtcdDeployment {
    /// Binaries installed and managed as a systemd service.
    #[default]
    Kubexm,
    /// Static pods managed by kubeadm.
    Kubeadm,
    /// A pre-existing cluster outside this tool's management.
    External,
}

/// Etcd deployment parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EtcdSpec {
    /// Deployment flavour.
    #[serde(rename = "type", default)]
    pub deployment: EtcdDeployment,
    /// Etcd version, with or without a leading `v`.
    #[serde(default = "default_etcd_version")]
    pub version: String,
    /// Client port.
    #[serde(default = "default_etcd_client_port")]
    pub client_port: u16,
    /// Peer port.
    #[serde(default = "default_etcd_peer_port")]
    pub peer_port: u16,
    /// Data directory on etcd hosts.
    #[serde(default = "default_etcd_data_dir")]
    pub data_dir: String,
}

impl Default for EtcdSpec {
    fn default() -> Self {
        Self {
            deployment: EtcdDeployment::default(),
            version: default_etcd_version(),
            client_port: defaults::ETCD_CLIENT_PORT,
            peer_port: defaults::ETCD_PEER_PORT,
            data_dir: defaults::ETCD_DATA_DIR.to_string(),
        }
    }
}

fn default_etcd_version() -> String {
    "v3.5.13".to_string()
}

fn default_etcd_client_port() -> u16 {
    defaults::ETCD_CLIENT_PORT
}

fn default_etcd_peer_port() -> u16 {
    defaults::ETCD_PEER_PORT
}

fn default_etcd_data_dir() -> String {
    defaults::ETCD_DATA_DIR.to_string()
}

/// The container runtime socket kubeadm and the kubelet talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CriSocket {
    /// containerd.
    #[default]
    Containerd,
    /// cri-dockerd shim.
    CriDockerd,
}

impl CriSocket {
    /// The unix socket path for this runtime.
    #[must_use]
    pub const fn path(self) -> &'static str {
        match self {
            Self::Containerd => defaults::CONTAINERD_SOCKET,
            Self::CriDockerd => defaults::CRI_DOCKERD_SOCKET,
        }
    }
}

/// Kubernetes component parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct KubernetesSpec {
    /// Kubernetes version, with or without a leading `v`.
    #[serde(default = "default_kubernetes_version")]
    pub version: String,
    /// Container runtime socket.
    #[serde(default)]
    pub cri_socket: CriSocket,
    /// Extra subject alternative names for the API server certificate.
    #[serde(default)]
    pub apiserver_cert_extra_sans: Vec<String>,
}

impl Default for KubernetesSpec {
    fn default() -> Self {
        Self {
            version: default_kubernetes_version(),
            cri_socket: CriSocket::default(),
            apiserver_cert_extra_sans: Vec::new(),
        }
    }
}

fn default_kubernetes_version() -> String {
    "v1.29.2".to_string()
}

/// The CNI plugin to deploy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkPlugin {
    #[default]
    Calico,
    Flannel,
    Cilium,
    /// No plugin is deployed; the operator brings their own.
    None,
}

/// Pod and service networking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NetworkSpec {
    /// CIDR pods are addressed from.
    #[serde(rename = "podCIDR", default = "default_pod_cidr")]
    pub pod_cidr: String,
    /// CIDR services are addressed from.
    #[serde(rename = "serviceCIDR", default = "default_service_cidr")]
    pub service_cidr: String,
    /// CNI plugin.
    #[serde(default)]
    pub plugin: NetworkPlugin,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            pod_cidr: default_pod_cidr(),
            service_cidr: default_service_cidr(),
            plugin: NetworkPlugin::default(),
        }
    }
}

fn default_pod_cidr() -> String {
    "10.233.64.0/18".to_string()
}

fn default_service_cidr() -> String {
    "10.233.0.0/18".to_string()
}

/// Image registry configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegistrySpec {
    /// Mirror endpoints tried in order before the upstream registry.
    #[serde(default)]
    pub mirrors: Vec<url::Url>,
    /// Optional registry deployed inside the cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_deployment: Option<LocalRegistrySpec>,
}

/// A registry deployed on cluster hosts as part of the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LocalRegistrySpec {
    /// Host name (from `hosts`) the registry runs on.
    pub host: String,
    /// Port the registry listens on.
    pub port: u16,
}

/// One machine in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HostSpec {
    /// Stable unique name; host identity for the whole run.
    pub name: String,
    /// Address the host is reached at.
    pub address: String,
    /// Address other cluster members reach the host at, when different.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub internal_address: Option<String>,
    /// CPU architecture, e.g. `amd64` or `arm64`.
    #[serde(default = "default_arch")]
    pub arch: String,
    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// SSH user.
    #[serde(default = "default_user")]
    pub user: String,
    /// Role names, e.g. `master`, `worker`, `etcd`, `registry`.
    pub roles: Vec<String>,
}

fn default_arch() -> String {
    "amd64".to_string()
}

fn default_ssh_port() -> u16 {
    defaults::SSH_PORT
}

fn default_user() -> String {
    "root".to_string()
}
