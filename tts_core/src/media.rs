//! Playable handles to synthesized audio and their release.
//!
//! A [`MediaHandle`] owns one spooled audio file. Clones share the file;
//! releasing through any clone deletes it exactly once, and dropping the
//! last clone releases it too. A released handle can no longer be played.

use std::collections::HashMap;
use std::hash::Hash;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, warn};

use crate::error::MediaError;
use crate::protocol::ResourceRef;

/// Destination for audio being played.
#[async_trait]
pub trait AudioSink: Send {
    async fn play(&mut self, audio: &[u8], resource: &ResourceRef) -> anyhow::Result<()>;
}

/// Collects played audio in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    audio: Vec<u8>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn audio(&self) -> &[u8] {
        &self.audio
    }

    pub fn into_base64(self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.audio)
    }
}

#[async_trait]
impl AudioSink for MemorySink {
    async fn play(&mut self, audio: &[u8], _resource: &ResourceRef) -> anyhow::Result<()> {
        self.audio.clear();
        self.audio.extend_from_slice(audio);
        Ok(())
    }
}

struct MediaResource {
    resource: ResourceRef,
    released: AtomicBool,
}

impl MediaResource {
    // Removal is a single unlink of a small local spool file, done inline so
    // the file is gone by the time `release` returns, even from async code.
    fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        match std::fs::remove_file(&self.resource.path) {
            Ok(()) => debug!("Released audio {}", self.resource.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Audio {} was already gone", self.resource.path.display())
            }
            Err(e) => warn!("Could not remove audio {}: {e}", self.resource.path.display()),
        }
        true
    }
}

impl Drop for MediaResource {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Clone)]
pub struct MediaHandle {
    inner: Arc<MediaResource>,
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("resource", &self.inner.resource)
            .field("released", &self.is_released())
            .finish()
    }
}

impl MediaHandle {
    pub fn new(resource: ResourceRef) -> Self {
        Self {
            inner: Arc::new(MediaResource {
                resource,
                released: AtomicBool::new(false),
            }),
        }
    }

    pub fn resource(&self) -> &ResourceRef {
        &self.inner.resource
    }

    pub fn path(&self) -> &Path {
        &self.inner.resource.path
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.inner.resource.sample_rate
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.inner.resource.duration_ms
    }

    pub fn is_released(&self) -> bool {
        self.inner.released.load(Ordering::Acquire)
    }

    /// Release the underlying audio. Returns `true` only for the call that
    /// actually released it.
    pub fn release(&self) -> bool {
        self.inner.release()
    }

    /// Hand the audio to `sink`.
    pub async fn play<S: AudioSink + ?Sized>(&self, sink: &mut S) -> Result<(), MediaError> {
        if self.is_released() {
            return Err(MediaError::UseAfterRelease);
        }
        let audio = match tokio::fs::read(self.path()).await {
            Ok(bytes) => bytes,
            // released while we were reading
            Err(_) if self.is_released() => return Err(MediaError::UseAfterRelease),
            Err(e) => return Err(MediaError::Io(e)),
        };
        sink.play(&audio, self.resource()).await?;
        Ok(())
    }
}

/// Current audio per logical slot (for example, one per story).
///
/// Putting a new handle into a slot releases the one it supersedes, so
/// reading the same story again does not pile up audio files.
pub struct MediaSlots<K> {
    slots: Mutex<HashMap<K, MediaHandle>>,
}

impl<K: Eq + Hash> Default for MediaSlots<K> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash> MediaSlots<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<K, MediaHandle>> {
        // A panic while holding the lock leaves the map itself intact.
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store `handle` in `key`, releasing whatever it replaces.
    /// Returns `true` if an earlier handle was superseded.
    pub fn replace(&self, key: K, handle: MediaHandle) -> bool {
        let previous = self.lock().insert(key, handle);
        match previous {
            Some(old) => {
                old.release();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &K) -> Option<MediaHandle> {
        self.lock().get(key).cloned()
    }

    /// Release and forget the handle in `key`.
    pub fn release(&self, key: &K) -> bool {
        let removed = self.lock().remove(key);
        match removed {
            Some(handle) => {
                handle.release();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
