//! Serialized job execution.
//!
//! Renders go through one background task fed by a channel, so at most one
//! workbook is open at a time. The automation engine requires this (the
//! spreadsheet application is single-instance), and the library engine
//! benefits from it (template reuse reads files the previous job wrote).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::publish::ArtifactPublisher;
use crate::render::{RenderError, Renderer};

#[derive(Debug)]
pub struct JobRequest {
    /// Platform URL copied from the browser.
    pub reference: String,
}

#[derive(Debug, Clone)]
pub struct JobError {
    pub status: u16,
    pub message: String,
}

pub type JobReply = Result<PathBuf, JobError>;
pub type JobSubmission = (JobRequest, oneshot::Sender<JobReply>);
pub type JobQueue = mpsc::Sender<JobSubmission>;

#[async_trait]
pub trait JobProcessor: Send + Sync {
    async fn process(&self, request: &JobRequest) -> JobReply;
}

/// The production pipeline: render, then file the result in the synced tree.
pub struct RenderPipeline {
    renderer: Renderer,
    publisher: Arc<ArtifactPublisher>,
}

impl RenderPipeline {
    pub fn new(renderer: Renderer, publisher: Arc<ArtifactPublisher>) -> Self {
        Self {
            renderer,
            publisher,
        }
    }
}

#[async_trait]
impl JobProcessor for RenderPipeline {
    async fn process(&self, request: &JobRequest) -> JobReply {
        let artifact = self
            .renderer
            .render(&request.reference)
            .await
            .map_err(|e| JobError {
                status: status_for(&e),
                message: e.to_string(),
            })?;

        // Publication is best-effort: the caller still gets the PDF even if
        // the cloud copy fails, and the failure is in the log.
        match &artifact.project_name {
            None => log::warn!(
                "no project name for {}; PDF kept locally only",
                request.reference
            ),
            Some(project) => {
                let publisher = self.publisher.clone();
                let pdf = artifact.pdf_path.clone();
                let project = project.clone();
                let category = artifact.category;
                let filename = artifact.filename.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    publisher.publish(&pdf, &project, category, &filename)
                })
                .await;
                match outcome {
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => log::error!("publish failed: {e}"),
                    Err(e) => log::error!("publish task failed: {e}"),
                }
            }
        }

        Ok(artifact.pdf_path)
    }
}

fn status_for(err: &RenderError) -> u16 {
    match err {
        RenderError::NoProjectId | RenderError::UnknownSection => 400,
        RenderError::NoPayments => 404,
        _ => 500,
    }
}

/// Spawn the worker loop and return its submission handle.
pub fn start_render_worker(processor: Arc<dyn JobProcessor>, capacity: usize) -> JobQueue {
    let (tx, mut rx) = mpsc::channel::<JobSubmission>(capacity);
    tokio::spawn(async move {
        while let Some((request, reply)) = rx.recv().await {
            log::info!("processing job for {}", request.reference);
            let result = processor.process(&request).await;
            if reply.send(result).is_err() {
                log::warn!("job submitter went away before the reply");
            }
        }
        log::info!("render worker shutting down");
    });
    tx
}
