use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sitedocs_server::worker::{
    start_render_worker, JobError, JobProcessor, JobReply, JobRequest,
};
use tokio::sync::oneshot;

struct ScriptedProcessor {
    seen: Mutex<Vec<String>>,
    delay: Duration,
}

impl ScriptedProcessor {
    fn new(delay: Duration) -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            delay,
        }
    }
}

#[async_trait]
impl JobProcessor for ScriptedProcessor {
    async fn process(&self, request: &JobRequest) -> JobReply {
        tokio::time::sleep(self.delay).await;
        self.seen.lock().unwrap().push(request.reference.clone());
        match request.reference.as_str() {
            "bad" => Err(JobError {
                status: 400,
                message: "unrecognized".to_string(),
            }),
            other => Ok(PathBuf::from(format!("{other}.pdf"))),
        }
    }
}

async fn submit(
    queue: &tokio::sync::mpsc::Sender<(JobRequest, oneshot::Sender<JobReply>)>,
    reference: &str,
) -> oneshot::Receiver<JobReply> {
    let (tx, rx) = oneshot::channel();
    queue
        .send((
            JobRequest {
                reference: reference.to_string(),
            },
            tx,
        ))
        .await
        .unwrap();
    rx
}

#[tokio::test]
async fn a_job_round_trips_through_the_worker() {
    let processor = Arc::new(ScriptedProcessor::new(Duration::ZERO));
    let queue = start_render_worker(processor, 8);

    let reply = submit(&queue, "job-1").await.await.unwrap();
    assert_eq!(reply.unwrap(), PathBuf::from("job-1.pdf"));
}

#[tokio::test]
async fn failures_carry_their_status_back_to_the_submitter() {
    let processor = Arc::new(ScriptedProcessor::new(Duration::ZERO));
    let queue = start_render_worker(processor, 8);

    let reply = submit(&queue, "bad").await.await.unwrap();
    let err = reply.unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.message, "unrecognized");
}

#[tokio::test]
async fn concurrent_submissions_are_processed_one_at_a_time_in_order() {
    let processor = Arc::new(ScriptedProcessor::new(Duration::from_millis(20)));
    let queue = start_render_worker(processor.clone(), 8);

    let first = submit(&queue, "first").await;
    let second = submit(&queue, "second").await;
    let third = submit(&queue, "third").await;

    third.await.unwrap().unwrap();
    second.await.unwrap().unwrap();
    first.await.unwrap().unwrap();

    assert_eq!(*processor.seen.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn the_worker_drains_after_the_queue_handle_is_dropped() {
    let processor = Arc::new(ScriptedProcessor::new(Duration::ZERO));
    let queue = start_render_worker(processor, 8);

    let pending = submit(&queue, "last").await;
    drop(queue);

    // The job already in the channel still completes.
    assert!(pending.await.unwrap().is_ok());
}
