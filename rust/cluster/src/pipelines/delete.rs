use async_trait::async_trait;

use kubexm_context::PipelineContext;
use kubexm_plan::{Module, Pipeline, PlanResult};

use crate::modules::TeardownModule;

/// Tear a cluster down and remove what the create pipeline placed.
pub struct DeleteClusterPipeline;

#[async_trait]
impl Pipeline for DeleteClusterPipeline {
    fn name(&self) -> &str {
        "delete-cluster"
    }

    fn description(&self) -> &str {
        "remove the cluster from its hosts"
    }

    fn modules(&self, _ctx: &PipelineContext) -> PlanResult<Vec<Box<dyn Module>>> {
        Ok(vec![Box::new(TeardownModule)])
    }
}
