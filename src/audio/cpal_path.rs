//! cpal-backed implementation of the half-duplex audio path
//!
//! Desktop stand-in for the device's I2S bus: one direction at a time,
//! torn down and rebuilt on every direction change. The cpal stream lives
//! on a dedicated thread (streams are not `Send`); samples cross over on
//! a bounded channel whose capacity also provides the write-side
//! backpressure.

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::audio::path::{AudioDirection, AudioPath};
use crate::error::AudioError;

enum Active {
    Capture {
        rx: Receiver<i16>,
        stop: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    },
    Playback {
        tx: Sender<i16>,
        stop: Arc<AtomicBool>,
        thread: JoinHandle<()>,
    },
}

pub struct CpalAudioPath {
    sample_rate: u32,
    active: Option<Active>,
}

impl CpalAudioPath {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            active: None,
        }
    }

    fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            channels: 1,
            sample_rate: SampleRate(self.sample_rate),
            buffer_size: BufferSize::Default,
        }
    }

    fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            let (stop, thread) = match active {
                Active::Capture { stop, thread, .. } => (stop, thread),
                Active::Playback { stop, thread, .. } => (stop, thread),
            };
            stop.store(true, Ordering::Release);
            let _ = thread.join();
            tracing::debug!("audio stream released");
        }
    }

    fn spawn_capture(&self) -> Result<Active, AudioError> {
        // One second of headroom between the callback and the reader.
        let (tx, rx) = bounded::<i16>(self.sample_rate as usize);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let config = self.stream_config();

        let thread = thread::Builder::new()
            .name("audio-capture-io".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_input_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(AudioError::DeviceNotFound(
                            "no default input device".to_string(),
                        )));
                        return;
                    }
                };

                let stream = device.build_input_stream(
                    &config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        for &sample in data {
                            // Overflow drops samples; the callback must
                            // never block.
                            if tx.try_send(sample).is_err() {
                                break;
                            }
                        }
                    },
                    |err| tracing::error!(%err, "input stream error"),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(err.to_string())));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(err.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                // Keep the thread (and with it the stream) alive.
                while !stop_thread.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Active::Capture { rx, stop, thread }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AudioError::StreamError(
                "audio thread did not come up".to_string(),
            )),
        }
    }

    fn spawn_playback(&self) -> Result<Active, AudioError> {
        // The channel bound doubles as the playback buffer: writers block
        // once a second of audio is queued.
        let (tx, rx) = bounded::<i16>(self.sample_rate as usize);
        let (ready_tx, ready_rx) = bounded::<Result<(), AudioError>>(1);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_thread = stop.clone();
        let config = self.stream_config();

        let thread = thread::Builder::new()
            .name("audio-playback-io".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let device = match host.default_output_device() {
                    Some(device) => device,
                    None => {
                        let _ = ready_tx.send(Err(AudioError::DeviceNotFound(
                            "no default output device".to_string(),
                        )));
                        return;
                    }
                };

                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        for sample in data.iter_mut() {
                            // Underrun plays silence.
                            *sample = rx.try_recv().unwrap_or(0);
                        }
                    },
                    |err| tracing::error!(%err, "output stream error"),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(err) => {
                        let _ = ready_tx.send(Err(AudioError::StreamError(err.to_string())));
                        return;
                    }
                };
                if let Err(err) = stream.play() {
                    let _ = ready_tx.send(Err(AudioError::StreamError(err.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while !stop_thread.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(10));
                }
            })
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Active::Playback { tx, stop, thread }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(AudioError::StreamError(
                "audio thread did not come up".to_string(),
            )),
        }
    }
}

#[async_trait]
impl AudioPath for CpalAudioPath {
    async fn configure(&mut self, direction: AudioDirection) -> Result<(), AudioError> {
        self.teardown();
        let active = match direction {
            AudioDirection::Capture => self.spawn_capture()?,
            AudioDirection::Playback => self.spawn_playback()?,
        };
        self.active = Some(active);
        tracing::info!(?direction, "audio stream configured");
        Ok(())
    }

    async fn suspend(&mut self) -> Result<(), AudioError> {
        self.teardown();
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<(), AudioError> {
        let Some(Active::Capture { rx, .. }) = self.active.as_ref() else {
            return Err(AudioError::NotConfigured);
        };

        // The channel receive parks the OS thread, so step out of the
        // async scheduler for the duration of the read.
        tokio::task::block_in_place(|| {
            let deadline = Instant::now() + timeout;
            let mut filled = 0;
            while filled + 2 <= buf.len() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(AudioError::ShortRead {
                        expected: buf.len(),
                        got: filled,
                    });
                }
                match rx.recv_timeout(remaining) {
                    Ok(sample) => {
                        buf[filled..filled + 2].copy_from_slice(&sample.to_le_bytes());
                        filled += 2;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        return Err(AudioError::ReadTimeout(timeout.as_millis() as u64));
                    }
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(AudioError::NotConfigured);
                    }
                }
            }
            Ok(())
        })
    }

    async fn write(&mut self, buf: &[u8]) -> Result<(), AudioError> {
        let Some(Active::Playback { tx, .. }) = self.active.as_ref() else {
            return Err(AudioError::NotConfigured);
        };

        tokio::task::block_in_place(|| {
            for pair in buf.chunks_exact(2) {
                let sample = i16::from_le_bytes([pair[0], pair[1]]);
                // Blocks once the playback buffer is full; that is the
                // drain guarantee, not a defect.
                if tx.send(sample).is_err() {
                    return Err(AudioError::WriteFailed(
                        "output stream closed".to_string(),
                    ));
                }
            }
            Ok(())
        })
    }
}

impl Drop for CpalAudioPath {
    fn drop(&mut self) {
        self.teardown();
    }
}
