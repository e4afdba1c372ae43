//! Application wiring.

use std::sync::Arc;

use crate::auth::{ApiGateway, CredentialStore, ReqwestTransport, StdinPrompt, TokenClient};
use crate::config::PlatformConfig;
use crate::publish::{ArtifactPublisher, CliSyncAgent};
use crate::render::{RenderError, Renderer};
use crate::worker::{start_render_worker, JobQueue, RenderPipeline};

/// Bounded queue: submitters wait at the handoff once this many jobs are
/// pending.
const JOB_QUEUE_CAPACITY: usize = 32;

pub struct AppState {
    pub jobs: JobQueue,
    pub publisher: Arc<ArtifactPublisher>,
    pub config: Arc<PlatformConfig>,
}

impl AppState {
    pub fn new(config: PlatformConfig) -> Result<Self, RenderError> {
        let config = Arc::new(config);
        let transport = Arc::new(ReqwestTransport::default());
        let store = CredentialStore::new(config.credential_file.clone());
        let tokens = TokenClient::new(config.clone(), transport.clone(), store);
        let gateway = Arc::new(ApiGateway::new(
            config.clone(),
            tokens,
            transport,
            Arc::new(StdinPrompt),
        ));

        let renderer = Renderer::new(config.clone(), gateway)?;
        let publisher = Arc::new(ArtifactPublisher::new(
            &config.sync_root,
            Box::new(CliSyncAgent::new(&config.sync_agent_cmd)),
        ));

        let pipeline = RenderPipeline::new(renderer, publisher.clone());
        let jobs = start_render_worker(Arc::new(pipeline), JOB_QUEUE_CAPACITY);

        Ok(Self {
            jobs,
            publisher,
            config,
        })
    }
}
