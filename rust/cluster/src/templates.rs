//! File templates rendered onto hosts. Placeholders use the step
//! library's `${key}` syntax.

/// systemd unit for a managed etcd member.
pub(crate) const ETCD_UNIT: &str = r"[Unit]
Description=etcd key-value store
Documentation=https://etcd.io
After=network.target

[Service]
Type=notify
ExecStart=/usr/local/bin/etcd \
  --name=${name} \
  --data-dir=${data_dir} \
  --listen-client-urls=https://${address}:${client_port},https://127.0.0.1:${client_port} \
  --advertise-client-urls=https://${address}:${client_port} \
  --listen-peer-urls=https://${address}:${peer_port} \
  --initial-advertise-peer-urls=https://${address}:${peer_port} \
  --initial-cluster=${initial_cluster} \
  --initial-cluster-state=new \
  --initial-cluster-token=${cluster_name}-etcd \
  --cert-file=/etc/etcd/pki/${name}.pem \
  --key-file=/etc/etcd/pki/${name}-key.pem \
  --peer-cert-file=/etc/etcd/pki/peer-${name}.pem \
  --peer-key-file=/etc/etcd/pki/peer-${name}-key.pem \
  --trusted-ca-file=/etc/etcd/pki/ca.pem \
  --peer-trusted-ca-file=/etc/etcd/pki/ca.pem \
  --client-cert-auth=true \
  --peer-client-cert-auth=true
Restart=on-failure
RestartSec=5
LimitNOFILE=65536

[Install]
WantedBy=multi-user.target
";

/// kubeadm configuration for `kubeadm init` on the first master.
pub(crate) const KUBEADM_INIT_CONFIG: &str = r"apiVersion: kubeadm.k8s.io/v1beta3
kind: InitConfiguration
nodeRegistration:
  criSocket: unix://${cri_socket}
---
apiVersion: kubeadm.k8s.io/v1beta3
kind: ClusterConfiguration
clusterName: ${cluster_name}
kubernetesVersion: ${kubernetes_version}
controlPlaneEndpoint: ${endpoint}
networking:
  podSubnet: ${pod_cidr}
  serviceSubnet: ${service_cidr}
apiServer:
  certSANs:
${cert_sans}
";

/// kubeadm configuration for joining a further control-plane node.
pub(crate) const KUBEADM_JOIN_MASTER_CONFIG: &str = r"apiVersion: kubeadm.k8s.io/v1beta3
kind: JoinConfiguration
nodeRegistration:
  criSocket: unix://${cri_socket}
discovery:
  bootstrapToken:
    apiServerEndpoint: ${endpoint}
    token: ${kubeadm.token}
    caCertHashes:
      - sha256:${kubeadm.discovery-hash}
controlPlane:
  certificateKey: ${kubeadm.certificate-key}
";

/// kubeadm configuration for joining a worker.
pub(crate) const KUBEADM_JOIN_WORKER_CONFIG: &str = r"apiVersion: kubeadm.k8s.io/v1beta3
kind: JoinConfiguration
nodeRegistration:
  criSocket: unix://${cri_socket}
discovery:
  bootstrapToken:
    apiServerEndpoint: ${endpoint}
    token: ${kubeadm.token}
    caCertHashes:
      - sha256:${kubeadm.discovery-hash}
";
