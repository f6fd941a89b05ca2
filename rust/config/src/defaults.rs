//! Well-known ports, paths, and host-side conventions.
//!
//! These are the fixed contracts concrete steps rely on; keeping them in
//! one place means a recipe and its precheck always agree on a path.

/// Default port for the Kubernetes API server endpoint.
pub const API_SERVER_PORT: u16 = 6443;

/// Default etcd client port.
pub const ETCD_CLIENT_PORT: u16 = 2379;

/// Default etcd peer port.
pub const ETCD_PEER_PORT: u16 = 2380;

/// Default etcd data directory on etcd hosts.
pub const ETCD_DATA_DIR: &str = "/var/lib/etcd";

/// Directory holding etcd certificates on etcd hosts.
pub const ETCD_PKI_DIR: &str = "/etc/etcd/pki";

/// Path of the etcd systemd unit on etcd hosts.
pub const ETCD_SYSTEMD_UNIT: &str = "/etc/systemd/system/etcd.service";

/// Directory etcd and Kubernetes binaries are installed into.
pub const BIN_DIR: &str = "/usr/local/bin";

/// CRI socket for containerd.
pub const CONTAINERD_SOCKET: &str = "/run/containerd/containerd.sock";

/// CRI socket for cri-dockerd.
pub const CRI_DOCKERD_SOCKET: &str = "/run/cri-dockerd.sock";

/// Default SSH port for hosts that do not declare one.
pub const SSH_PORT: u16 = 22;

/// Name of the work-directory created under the current directory.
pub const WORK_DIR_NAME: &str = ".kubexm";
