use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::CommandGenerator;
use crate::domain::request::RequestId;
use crate::domain::resource::ResourceRef;
use crate::execution::{BackendError, ExecutionBackend, ExecutionContext};

/// Answers whether a resource exists in the management plane right now.
#[async_trait]
pub trait ResourceVerifier: Send + Sync {
    async fn exists(
        &self,
        request_id: &RequestId,
        resource: &ResourceRef,
    ) -> Result<bool, BackendError>;
}

/// Runs the generated existence probe through an execution backend.
pub struct CliVerifier<B> {
    backend: B,
    generator: CommandGenerator,
    timeout: Duration,
}

impl<B> CliVerifier<B>
where
    B: ExecutionBackend,
{
    pub fn new(backend: B, generator: CommandGenerator, timeout: Duration) -> Self {
        Self { backend, generator, timeout }
    }
}

#[async_trait]
impl<B> ResourceVerifier for CliVerifier<B>
where
    B: ExecutionBackend,
{
    async fn exists(
        &self,
        request_id: &RequestId,
        resource: &ResourceRef,
    ) -> Result<bool, BackendError> {
        let probe = self.generator.existence_probe(resource);
        let context = ExecutionContext { request_id: *request_id, resource: resource.clone() };
        let output = self.backend.run(&probe.command, &context, self.timeout).await?;

        if output.timed_out {
            warn!(
                event_name = "execution.verify_timeout",
                request_id = %request_id,
                resource_name = %resource.name,
                "existence probe timed out"
            );
            return Ok(false);
        }

        let exists = probe.interpret(output.exit_code, &output.stdout);
        info!(
            event_name = "execution.verified",
            request_id = %request_id,
            resource_type = resource.kind.as_str(),
            resource_name = %resource.name,
            exists,
            "existence probe finished"
        );
        Ok(exists)
    }
}
