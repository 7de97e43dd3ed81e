//! Client state machine
//!
//! One authoritative state value gates what every worker may do.
//! [`StateController::set`] is the only sanctioned mutator; workers read
//! lock-free snapshots that are eventually consistent with the cell.

use chrono::Utc;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::audio::path::{AudioDirection, SharedAudioPath};
use crate::constants::{OUTBOUND_PUSH_TIMEOUT_MS, PATH_SETTLE_MS, STATE_LOCK_TIMEOUT_MS};
use crate::protocol::{Notification, OutboundMessage};

/// The device lifecycle states. `Shutdown` is terminal: every worker loop
/// observes it and exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Booting = 0,
    Connected,
    Idle,
    Recording,
    Processing,
    Playing,
    CameraCapture,
    Stalled,
    Shutdown,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ClientState::Booting,
            1 => ClientState::Connected,
            2 => ClientState::Idle,
            3 => ClientState::Recording,
            4 => ClientState::Processing,
            5 => ClientState::Playing,
            6 => ClientState::CameraCapture,
            7 => ClientState::Stalled,
            _ => ClientState::Shutdown,
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClientState::Booting => "BOOTING",
            ClientState::Connected => "CONNECTED",
            ClientState::Idle => "IDLE",
            ClientState::Recording => "RECORDING",
            ClientState::Processing => "PROCESSING",
            ClientState::Playing => "PLAYING",
            ClientState::CameraCapture => "CAMERA_CAPTURE",
            ClientState::Stalled => "STALLED",
            ClientState::Shutdown => "SHUTDOWN",
        };
        write!(f, "{name}")
    }
}

/// Maps a transition to its protocol notification, if any.
///
/// First match wins: a transition produces at most one record. Leaving
/// `Recording` takes precedence over entering `Playing`, so a direct
/// RECORDING→PLAYING hop reports the stop, not the playback readiness.
pub fn transition_notice(old: ClientState, new: ClientState) -> Option<Notification> {
    use ClientState::*;

    if new == Idle && old == Connected {
        Some(Notification::ClientOn {
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    } else if new == Recording && old != Recording {
        Some(Notification::RecordingStarted {
            ts: Utc::now().timestamp_millis(),
        })
    } else if old == Recording && new != Recording {
        Some(Notification::RecordingStopped)
    } else if new == Playing {
        Some(Notification::ReadyForPlayback)
    } else if old == Playing && new == Idle {
        Some(Notification::PlaybackComplete)
    } else {
        None
    }
}

/// Owns the authoritative state cell and performs guarded transitions.
pub struct StateController {
    cell: tokio::sync::Mutex<ClientState>,
    snapshot: AtomicU8,
    outbound: mpsc::Sender<OutboundMessage>,
    audio: SharedAudioPath,
}

impl StateController {
    pub fn new(outbound: mpsc::Sender<OutboundMessage>, audio: SharedAudioPath) -> Self {
        Self {
            cell: tokio::sync::Mutex::new(ClientState::Booting),
            snapshot: AtomicU8::new(ClientState::Booting as u8),
            outbound,
            audio,
        }
    }

    /// Lock-free read of the current state.
    pub fn snapshot(&self) -> ClientState {
        ClientState::from_u8(self.snapshot.load(Ordering::Acquire))
    }

    pub fn is_shutdown(&self) -> bool {
        self.snapshot() == ClientState::Shutdown
    }

    /// Perform a guarded transition with its side effects: audio path
    /// reconfiguration when entering RECORDING or PLAYING, and the mapped
    /// protocol notification.
    ///
    /// The lock wait is bounded; on timeout the transition is skipped
    /// entirely rather than blocking the caller.
    pub async fn set(&self, new: ClientState) {
        let mut guard = match timeout(
            Duration::from_millis(STATE_LOCK_TIMEOUT_MS),
            self.cell.lock(),
        )
        .await
        {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!(state = %new, "state lock busy, transition skipped");
                return;
            }
        };

        let old = *guard;
        *guard = new;
        self.snapshot.store(new as u8, Ordering::Release);

        if new == ClientState::Recording && old != ClientState::Recording {
            self.swing_path(AudioDirection::Capture).await;
        } else if new == ClientState::Playing && old != ClientState::Playing {
            self.swing_path(AudioDirection::Playback).await;
        }

        if let Some(notice) = transition_notice(old, new) {
            if self
                .outbound
                .send_timeout(
                    OutboundMessage::Control(notice),
                    Duration::from_millis(OUTBOUND_PUSH_TIMEOUT_MS),
                )
                .await
                .is_err()
            {
                tracing::error!("failed to queue state change notification");
            }
        }

        tracing::info!(from = %old, to = %new, "state changed");
        // The indicator worker derives its pattern from the snapshot.
    }

    /// Swing the half-duplex path to a new direction with settle delays
    /// on both sides. Failures are logged; the transition proceeds.
    async fn swing_path(&self, direction: AudioDirection) {
        if let Err(err) = self.audio.suspend().await {
            tracing::warn!(%err, "failed to suspend audio path");
        }
        tokio::time::sleep(Duration::from_millis(PATH_SETTLE_MS)).await;

        match self.audio.configure(direction).await {
            Ok(()) => tracing::info!(?direction, "audio path reconfigured"),
            Err(err) => tracing::error!(%err, ?direction, "failed to reconfigure audio path"),
        }
        tokio::time::sleep(Duration::from_millis(PATH_SETTLE_MS)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::path::NullAudioPath;

    fn controller(depth: usize) -> (StateController, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(depth);
        let audio = SharedAudioPath::new(Box::new(NullAudioPath::new(16_000)));
        (StateController::new(tx, audio), rx)
    }

    fn drain(rx: &mut mpsc::Receiver<OutboundMessage>) -> Vec<Notification> {
        let mut notices = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let OutboundMessage::Control(notice) = msg {
                notices.push(notice);
            }
        }
        notices
    }

    #[test]
    fn test_transition_table() {
        use ClientState::*;

        assert_eq!(transition_notice(Booting, Connected), None);
        assert!(matches!(
            transition_notice(Connected, Idle),
            Some(Notification::ClientOn { .. })
        ));
        assert!(matches!(
            transition_notice(Idle, Recording),
            Some(Notification::RecordingStarted { .. })
        ));
        assert_eq!(
            transition_notice(Recording, Processing),
            Some(Notification::RecordingStopped)
        );
        assert_eq!(
            transition_notice(Processing, Playing),
            Some(Notification::ReadyForPlayback)
        );
        assert_eq!(
            transition_notice(Playing, Idle),
            Some(Notification::PlaybackComplete)
        );

        // Leaving RECORDING wins over entering PLAYING.
        assert_eq!(
            transition_notice(Recording, Playing),
            Some(Notification::RecordingStopped)
        );

        // Silent transitions.
        assert_eq!(transition_notice(Idle, Processing), None);
        assert_eq!(transition_notice(Idle, CameraCapture), None);
        assert_eq!(transition_notice(Idle, Stalled), None);
        assert_eq!(transition_notice(Processing, Shutdown), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boot_sequence_emits_one_client_on() {
        let (controller, mut rx) = controller(16);

        controller.set(ClientState::Connected).await;
        controller.set(ClientState::Idle).await;

        let notices = drain(&mut rx);
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], Notification::ClientOn { .. }));
        assert_eq!(controller.snapshot(), ClientState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recording_cycle_notification_order() {
        let (controller, mut rx) = controller(16);

        controller.set(ClientState::Connected).await;
        controller.set(ClientState::Idle).await;
        drain(&mut rx);

        controller.set(ClientState::Recording).await;
        controller.set(ClientState::Processing).await;

        let notices = drain(&mut rx);
        assert_eq!(notices.len(), 2);
        assert!(matches!(notices[0], Notification::RecordingStarted { .. }));
        assert_eq!(notices[1], Notification::RecordingStopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_tracks_transitions() {
        let (controller, _rx) = controller(16);
        assert_eq!(controller.snapshot(), ClientState::Booting);

        controller.set(ClientState::Connected).await;
        assert_eq!(controller.snapshot(), ClientState::Connected);
        assert!(!controller.is_shutdown());

        controller.set(ClientState::Shutdown).await;
        assert!(controller.is_shutdown());
    }
}
