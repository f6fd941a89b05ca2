//! The documented cache-key taxonomy recipes publish and consume.
//!
//! Keys are name-spaced strings; values are tagged JSON. Earlier steps
//! write them, later steps read them; there is no other channel
//! between tasks.

/// Bootstrap token minted on the first master (pipeline scope).
pub const KUBEADM_TOKEN: &str = "kubeadm.token";

/// CA cert hash used by `kubeadm join` discovery (pipeline scope).
pub const KUBEADM_DISCOVERY_HASH: &str = "kubeadm.discovery-hash";

/// Certificate key for control-plane joins (pipeline scope).
pub const KUBEADM_CERTIFICATE_KEY: &str = "kubeadm.certificate-key";

/// Per-host OS facts recorded by preflight (pipeline scope).
#[must_use]
pub fn host_facts(host: &str) -> String {
    format!("facts.{host}")
}
