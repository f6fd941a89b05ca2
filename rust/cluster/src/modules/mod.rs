//! The subsystem modules pipelines compose.

mod controlplane;
mod etcd;
mod network;
mod preflight;
mod teardown;
mod worker;

pub use controlplane::ControlPlaneModule;
pub use etcd::DistributeFilesStep;
pub use etcd::EtcdModule;
pub use network::NetworkModule;
pub use preflight::{GatherFactsStep, PreflightModule};
pub use teardown::TeardownModule;
pub use worker::WorkerModule;
