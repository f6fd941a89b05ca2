use async_trait::async_trait;

use kubexm_context::PipelineContext;
use kubexm_plan::{Module, Pipeline, PlanResult};

use crate::modules::{
    ControlPlaneModule, EtcdModule, NetworkModule, PreflightModule, WorkerModule,
};

/// Bring a cluster up from nothing: preflight, etcd, control plane,
/// workers, network.
pub struct CreateClusterPipeline;

#[async_trait]
impl Pipeline for CreateClusterPipeline {
    fn name(&self) -> &str {
        "create-cluster"
    }

    fn description(&self) -> &str {
        "create a cluster from the specification"
    }

    fn modules(&self, _ctx: &PipelineContext) -> PlanResult<Vec<Box<dyn Module>>> {
        Ok(vec![
            Box::new(PreflightModule),
            Box::new(EtcdModule),
            Box::new(ControlPlaneModule),
            Box::new(WorkerModule),
            Box::new(NetworkModule),
        ])
    }
}
