use async_trait::async_trait;

use crate::collaborators::JitPolicy;
use crate::flow::FlowContext;

/// JIT handling is needed as soon as one completed step was federated.
#[derive(Debug, Clone, Copy, Default)]
pub struct FederatedStepPolicy;

#[async_trait]
impl JitPolicy for FederatedStepPolicy {
    async fn is_jit_handling_needed(&self, context: &FlowContext) -> bool {
        context.steps().iter().any(|s| s.is_federated())
    }
}
