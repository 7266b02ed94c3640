//! Correlated request/response channel to the synthesis worker.
//!
//! Every call gets a fresh correlation id and its own pending slot. A single
//! listener task reads the worker's responses and resolves the slot whose id
//! the response carries, and only that slot. Responses that match no pending
//! slot are protocol errors: they are logged and dropped, never handed to
//! some other caller. The one exception is a late answer to a request that
//! timed out here; its audio is deleted instead.

use std::collections::VecDeque;
use std::path::{Component, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::SynthesisError;
use crate::media::MediaHandle;
use crate::protocol::{ProtocolViolation, Reply, ResourceRef, WorkerRequest, WorkerResponse};
use crate::service::SynthesisService;
use crate::worker::{spawn_worker, WorkerLink};

pub const DEFAULT_SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// How many timed-out ids are remembered for late-response cleanup.
const EXPIRED_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Where the worker writes synthesized audio.
    pub spool_dir: PathBuf,
    /// How long a caller waits for its response.
    pub timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            spool_dir: std::env::temp_dir().join("story-audio"),
            timeout: DEFAULT_SYNTHESIS_TIMEOUT,
        }
    }
}

type Slot = oneshot::Sender<Result<MediaHandle, SynthesisError>>;

/// What the listener did with a well-formed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatched {
    Delivered(Uuid),
    /// The caller had already timed out; any audio was deleted.
    Expired(Uuid),
}

/// Pending slots keyed by correlation id. Only the channel touches it.
struct PendingRequests {
    slots: DashMap<Uuid, Slot>,
    expired: Mutex<VecDeque<Uuid>>,
    spool_dir: PathBuf,
}

impl PendingRequests {
    fn new(spool_dir: PathBuf) -> Self {
        Self {
            slots: DashMap::new(),
            expired: Mutex::new(VecDeque::new()),
            spool_dir,
        }
    }

    fn register(
        &self,
        id: Uuid,
    ) -> Result<oneshot::Receiver<Result<MediaHandle, SynthesisError>>, ProtocolViolation> {
        match self.slots.entry(id) {
            Entry::Occupied(_) => Err(ProtocolViolation::DuplicateCorrelationId(id)),
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(tx);
                Ok(rx)
            }
        }
    }

    fn forget(&self, id: &Uuid) -> bool {
        self.slots.remove(id).is_some()
    }

    fn expired(&self) -> MutexGuard<'_, VecDeque<Uuid>> {
        self.expired.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drop the slot of a timed-out call and remember its id.
    fn expire(&self, id: Uuid) -> bool {
        // Held across the removal so the listener sees either the slot or the id.
        let mut expired = self.expired();
        if self.slots.remove(&id).is_none() {
            return false;
        }
        if expired.len() == EXPIRED_CAPACITY {
            expired.pop_front();
        }
        expired.push_back(id);
        true
    }

    fn take_expired(&self, id: &Uuid) -> bool {
        let mut expired = self.expired();
        match expired.iter().position(|e| e == id) {
            Some(pos) => {
                expired.remove(pos);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    /// Wrap a resource the worker spooled. Anything outside the spool
    /// directory is refused, since releasing a handle deletes its file.
    fn adopt(&self, resource: ResourceRef) -> Result<MediaHandle, ProtocolViolation> {
        let path = &resource.path;
        let inside = path.starts_with(&self.spool_dir)
            && path != &self.spool_dir
            && !path.components().any(|c| matches!(c, Component::ParentDir));
        if inside {
            Ok(MediaHandle::new(resource))
        } else {
            Err(ProtocolViolation::ForeignResource(resource.path))
        }
    }

    /// Route one response frame to its slot.
    fn dispatch(&self, frame: &str) -> Result<Dispatched, ProtocolViolation> {
        let response: WorkerResponse = serde_json::from_str(frame)
            .map_err(|e| ProtocolViolation::Unparsable(e.to_string()))?;
        let id = response.correlation()?;

        let slot = match self.slots.remove(&id) {
            Some((_, slot)) => slot,
            None if self.take_expired(&id) => {
                if let Ok(Reply::Succeeded(resource)) = response.into_reply() {
                    self.adopt(resource)?.release();
                }
                return Ok(Dispatched::Expired(id));
            }
            None => return Err(ProtocolViolation::UnknownCorrelationId(id)),
        };

        let outcome = response.into_reply().and_then(|reply| match reply {
            Reply::Succeeded(resource) => self.adopt(resource).map(Ok),
            Reply::Failed { kind, message, status } => Ok(Err(kind.into_error(message, status))),
        });
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(violation) => {
                // The id matched, so the caller is told rather than left to time out.
                let _ = slot.send(Err(SynthesisError::WorkerProtocol(violation.clone())));
                return Err(violation);
            }
        };

        // A caller that gave up drops its receiver; an undelivered handle is
        // dropped here and releases its audio.
        if slot.send(outcome).is_err() {
            debug!(correlation_id = %id, "caller gone before its response arrived");
        }
        Ok(Dispatched::Delivered(id))
    }

    /// Fail every pending caller with `ChannelClosed`.
    fn close_all(&self) {
        self.slots.clear();
    }
}

/// Long-lived channel to one synthesis worker.
///
/// Create it once and share it; `synthesize` may be called concurrently.
pub struct SynthesisChannel {
    requests: UnboundedSender<String>,
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
    timeout: Duration,
    listener: JoinHandle<()>,
}

impl SynthesisChannel {
    /// Start a worker thread running `service` and connect to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        service: Arc<dyn SynthesisService>,
        config: ChannelConfig,
    ) -> Result<Self, SynthesisError> {
        let WorkerLink { requests, responses } = spawn_worker(service, config.spool_dir.clone())?;
        info!("Synthesis channel connected to worker");
        Ok(Self::connect(requests, responses, config))
    }

    /// Connect to a worker through an existing pair of frame channels.
    ///
    /// Only resources inside `config.spool_dir` are accepted from the worker.
    pub fn connect(
        requests: UnboundedSender<String>,
        responses: UnboundedReceiver<String>,
        config: ChannelConfig,
    ) -> Self {
        let pending = Arc::new(PendingRequests::new(config.spool_dir));
        let closed = Arc::new(AtomicBool::new(false));
        let listener = tokio::spawn(listen(pending.clone(), closed.clone(), responses));
        Self {
            requests,
            pending,
            closed,
            timeout: config.timeout,
            listener,
        }
    }

    /// Number of requests still waiting for their response.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Synthesize `text` in the worker and return a handle to the audio.
    pub async fn synthesize(
        &self,
        text: &str,
        credentials: &str,
    ) -> Result<MediaHandle, SynthesisError> {
        if self.is_closed() {
            return Err(SynthesisError::ChannelClosed);
        }

        let correlation_id = Uuid::new_v4();
        let response = self.pending.register(correlation_id)?;

        let frame = serde_json::to_string(&WorkerRequest {
            correlation_id,
            text: text.to_string(),
            credentials: credentials.to_string(),
        });
        let frame = match frame {
            Ok(f) => f,
            Err(e) => {
                self.pending.forget(&correlation_id);
                return Err(ProtocolViolation::Encode(e.to_string()).into());
            }
        };

        if self.requests.send(frame).is_err() || self.is_closed() {
            self.pending.forget(&correlation_id);
            return Err(SynthesisError::ChannelClosed);
        }
        debug!(%correlation_id, "synthesis request sent");

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(SynthesisError::ChannelClosed),
            Err(_) => {
                self.pending.expire(correlation_id);
                warn!(%correlation_id, "synthesis timed out after {:?}", self.timeout);
                Err(SynthesisError::Timeout(self.timeout))
            }
        }
    }
}

impl Drop for SynthesisChannel {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn listen(
    pending: Arc<PendingRequests>,
    closed: Arc<AtomicBool>,
    mut responses: UnboundedReceiver<String>,
) {
    while let Some(frame) = responses.recv().await {
        match pending.dispatch(&frame) {
            Ok(Dispatched::Delivered(id)) => {
                debug!(correlation_id = %id, "synthesis response delivered")
            }
            Ok(Dispatched::Expired(id)) => {
                warn!(correlation_id = %id, "late synthesis response after timeout, audio discarded")
            }
            Err(violation) => error!("Discarding worker response: {violation}"),
        }
    }

    closed.store(true, Ordering::Release);
    let orphaned = pending.len();
    pending.close_all();
    warn!("Synthesis worker channel closed, failed {} pending requests", orphaned);
}
