//! The isolated synthesis worker.
//!
//! One dedicated OS thread with its own single-threaded tokio runtime. It
//! shares nothing with its owner: requests come in and responses go out as
//! JSON frames over a pair of channels. Each request is handled on its own
//! task, so a slow synthesis never holds up a fast one and responses leave
//! in completion order.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info};

use crate::error::SynthesisError;
use crate::protocol::{ResourceRef, WorkerRequest, WorkerResponse};
use crate::service::{AudioFormat, AudioPayload, SynthesisService};
use crate::wav::read_wav_info;

/// Owner-side ends of the worker's frame channels.
pub struct WorkerLink {
    pub requests: UnboundedSender<String>,
    pub responses: UnboundedReceiver<String>,
}

/// Start the worker thread. It stops once the request sender is dropped.
pub fn spawn_worker(
    service: Arc<dyn SynthesisService>,
    spool_dir: PathBuf,
) -> std::io::Result<WorkerLink> {
    let (request_tx, request_rx) = mpsc::unbounded_channel::<String>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<String>();

    thread::Builder::new()
        .name("synthesis-worker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("Could not start synthesis worker runtime: {e}");
                    return;
                }
            };
            runtime.block_on(worker_loop(service, spool_dir, request_rx, response_tx));
        })?;

    Ok(WorkerLink {
        requests: request_tx,
        responses: response_rx,
    })
}

async fn worker_loop(
    service: Arc<dyn SynthesisService>,
    spool_dir: PathBuf,
    mut requests: UnboundedReceiver<String>,
    responses: UnboundedSender<String>,
) {
    info!("Synthesis worker started, spooling audio to {}", spool_dir.display());

    while let Some(frame) = requests.recv().await {
        let service = service.clone();
        let spool_dir = spool_dir.clone();
        let responses = responses.clone();
        tokio::spawn(async move {
            if let Some(reply) = handle_frame(&frame, service.as_ref(), &spool_dir).await {
                if responses.send(reply).is_err() {
                    debug!("Synthesis channel gone, dropping response");
                }
            }
        });
    }

    info!("Synthesis worker stopped");
}

/// Handle one request frame. Returns nothing when there is no one to answer.
async fn handle_frame(
    frame: &str,
    service: &dyn SynthesisService,
    spool_dir: &Path,
) -> Option<String> {
    let request: WorkerRequest = match serde_json::from_str(frame) {
        Ok(r) => r,
        Err(e) => {
            error!("Worker received a malformed request, dropping it: {e}");
            return None;
        }
    };
    let correlation_id = request.correlation_id;
    debug!(%correlation_id, "worker synthesizing {} characters", request.text.len());

    let response = match synthesize_to_spool(&request, service, spool_dir).await {
        Ok(resource) => WorkerResponse::success(correlation_id, resource),
        Err(e) => {
            debug!(%correlation_id, "worker synthesis failed: {e}");
            WorkerResponse::failure(correlation_id, &e)
        }
    };

    match serde_json::to_string(&response) {
        Ok(reply) => Some(reply),
        Err(e) => {
            error!(%correlation_id, "Could not encode worker response: {e}");
            None
        }
    }
}

async fn synthesize_to_spool(
    request: &WorkerRequest,
    service: &dyn SynthesisService,
    spool_dir: &Path,
) -> Result<ResourceRef, SynthesisError> {
    let payload = service
        .synthesize(&request.text, &request.credentials)
        .await?;

    tokio::fs::create_dir_all(spool_dir).await?;
    let path = spool_dir.join(format!(
        "{}.{}",
        request.correlation_id,
        payload.format.extension()
    ));
    tokio::fs::write(&path, &payload.bytes).await?;

    Ok(describe(path, &payload))
}

fn describe(path: PathBuf, payload: &AudioPayload) -> ResourceRef {
    let mut resource = ResourceRef::new(path);
    if payload.format == AudioFormat::Wav {
        match read_wav_info(&payload.bytes) {
            Ok(info) => {
                resource.sample_rate = Some(info.sample_rate);
                resource.duration_ms = Some(info.duration_ms);
            }
            Err(e) => debug!("Could not read WAV header: {e:#}"),
        }
    }
    resource
}
