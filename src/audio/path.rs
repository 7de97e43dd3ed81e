//! Shared half-duplex audio path
//!
//! The hardware can capture or play, never both. Direction changes are
//! performed only by the state controller during a transition; workers
//! take bounded-wait exclusive access for individual reads and writes.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::constants::{
    CAPTURE_READ_TIMEOUT_MS, PATH_LOCK_TIMEOUT_MS, PATH_RECONFIG_TIMEOUT_MS,
};
use crate::error::AudioError;

/// Direction the half-duplex path is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioDirection {
    Capture,
    Playback,
}

/// The audio hardware behind the path.
#[async_trait]
pub trait AudioPath: Send {
    /// Bring the hardware up in the given direction, tearing down any
    /// previous configuration.
    async fn configure(&mut self, direction: AudioDirection) -> Result<(), AudioError>;

    /// Release the hardware entirely, e.g. to hand shared pins to the
    /// camera peripheral.
    async fn suspend(&mut self) -> Result<(), AudioError>;

    /// Fill `buf` completely or fail within `timeout`.
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), AudioError>;

    /// Write the whole buffer, blocking until the hardware accepts it.
    /// No timeout: playback must drain, not skip.
    async fn write(&mut self, buf: &[u8]) -> Result<(), AudioError>;
}

/// Handle sharing one [`AudioPath`] across workers.
#[derive(Clone)]
pub struct SharedAudioPath {
    inner: Arc<tokio::sync::Mutex<Box<dyn AudioPath>>>,
}

impl SharedAudioPath {
    pub fn new(path: Box<dyn AudioPath>) -> Self {
        Self {
            inner: Arc::new(tokio::sync::Mutex::new(path)),
        }
    }

    /// Capture-side read: bounded wait for the lock, then a bounded read
    /// of the full buffer.
    pub async fn read_chunk(&self, buf: &mut [u8]) -> Result<(), AudioError> {
        let mut path = timeout(Duration::from_millis(PATH_LOCK_TIMEOUT_MS), self.inner.lock())
            .await
            .map_err(|_| AudioError::PathBusy)?;
        path.read(buf, Duration::from_millis(CAPTURE_READ_TIMEOUT_MS))
            .await
    }

    /// Playback-side write. Waits for the lock without bound: playback
    /// must drain every queued chunk.
    pub async fn write_chunk(&self, data: &[u8]) -> Result<(), AudioError> {
        let mut path = self.inner.lock().await;
        path.write(data).await
    }

    /// Reconfigure the path direction. Only the state controller calls
    /// this, never a worker mid-operation.
    pub async fn configure(&self, direction: AudioDirection) -> Result<(), AudioError> {
        let mut path = timeout(
            Duration::from_millis(PATH_RECONFIG_TIMEOUT_MS),
            self.inner.lock(),
        )
        .await
        .map_err(|_| AudioError::PathBusy)?;
        path.configure(direction).await
    }

    /// Release the hardware entirely.
    pub async fn suspend(&self) -> Result<(), AudioError> {
        let mut path = timeout(
            Duration::from_millis(PATH_RECONFIG_TIMEOUT_MS),
            self.inner.lock(),
        )
        .await
        .map_err(|_| AudioError::PathBusy)?;
        path.suspend().await
    }
}

/// Audio path that produces silence and discards writes, pacing reads at
/// real time. Stands in when no audio hardware is present; also the mock
/// of choice in tests.
pub struct NullAudioPath {
    sample_rate: u32,
    direction: Option<AudioDirection>,
}

impl NullAudioPath {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            direction: None,
        }
    }

    fn chunk_duration(&self, bytes: usize) -> Duration {
        let samples = (bytes / 2) as u64;
        Duration::from_millis(samples * 1_000 / u64::from(self.sample_rate))
    }
}

#[async_trait]
impl AudioPath for NullAudioPath {
    async fn configure(&mut self, direction: AudioDirection) -> Result<(), AudioError> {
        self.direction = Some(direction);
        Ok(())
    }

    async fn suspend(&mut self) -> Result<(), AudioError> {
        self.direction = None;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), AudioError> {
        if self.direction != Some(AudioDirection::Capture) {
            return Err(AudioError::NotConfigured);
        }
        let wait = self.chunk_duration(buf.len()).min(timeout);
        tokio::time::sleep(wait).await;
        buf.fill(0);
        Ok(())
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), AudioError> {
        if self.direction != Some(AudioDirection::Playback) {
            return Err(AudioError::NotConfigured);
        }
        tokio::time::sleep(self.chunk_duration(buf.len())).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_null_path_requires_direction() {
        let path = SharedAudioPath::new(Box::new(NullAudioPath::new(16_000)));
        let mut buf = [0u8; 32];

        // Not configured yet.
        assert!(path.read_chunk(&mut buf).await.is_err());

        path.configure(AudioDirection::Capture).await.unwrap();
        assert!(path.read_chunk(&mut buf).await.is_ok());

        // Wrong direction for writes.
        assert!(path.write_chunk(&buf).await.is_err());

        path.configure(AudioDirection::Playback).await.unwrap();
        assert!(path.write_chunk(&buf).await.is_ok());
    }
}
