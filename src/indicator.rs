//! Status indicator worker
//!
//! Plays a blink pattern derived from the current state, interrupted by
//! one-shot alert patterns for rejections and server requests. Patterns
//! are tuned to be distinguishable at a glance: busy rejection is a
//! triple quick flash, user intervention a rapid flash burst.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::context::AppContext;
use crate::state::ClientState;

/// The physical status light.
pub trait StatusIndicator: Send + Sync {
    fn set_level(&self, on: bool);
}

/// One-shot feedback patterns layered over the state blink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alert {
    /// Busy rejection: triple quick flash.
    Reject,
    /// Server asked for a re-record: five slow flashes.
    Rerecord,
    /// Operator attention required: rapid flash burst.
    UserIntervention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pattern {
    on_ms: u64,
    off_ms: u64,
    cycles: u32,
}

fn alert_pattern(alert: Alert) -> Pattern {
    match alert {
        Alert::Reject => Pattern { on_ms: 100, off_ms: 100, cycles: 3 },
        Alert::Rerecord => Pattern { on_ms: 200, off_ms: 200, cycles: 5 },
        Alert::UserIntervention => Pattern { on_ms: 100, off_ms: 100, cycles: 10 },
    }
}

/// One period of the steady pattern for a state; `None` means dark.
fn state_pattern(state: ClientState) -> Option<Pattern> {
    match state {
        ClientState::Idle => Some(Pattern { on_ms: 100, off_ms: 900, cycles: 1 }),
        ClientState::Recording => Some(Pattern { on_ms: 100, off_ms: 100, cycles: 1 }),
        ClientState::Processing => Some(Pattern { on_ms: 300, off_ms: 300, cycles: 1 }),
        // Solid on while playing.
        ClientState::Playing => Some(Pattern { on_ms: 100, off_ms: 0, cycles: 1 }),
        ClientState::CameraCapture => Some(Pattern { on_ms: 50, off_ms: 50, cycles: 3 }),
        _ => None,
    }
}

/// Indicator worker: repeats the state pattern, preempted between cycles
/// by queued alerts. Runs until shutdown.
pub async fn run(
    ctx: Arc<AppContext>,
    indicator: Arc<dyn StatusIndicator>,
    mut alerts: mpsc::Receiver<Alert>,
) {
    tracing::debug!("indicator worker started");
    while !ctx.state.is_shutdown() {
        if let Ok(alert) = alerts.try_recv() {
            play(indicator.as_ref(), alert_pattern(alert)).await;
            continue;
        }

        match state_pattern(ctx.state.snapshot()) {
            Some(pattern) => play(indicator.as_ref(), pattern).await,
            None => {
                indicator.set_level(false);
                sleep(Duration::from_millis(100)).await;
            }
        }
    }
    indicator.set_level(false);
    tracing::debug!("indicator worker stopped");
}

async fn play(indicator: &dyn StatusIndicator, pattern: Pattern) {
    for _ in 0..pattern.cycles {
        indicator.set_level(true);
        sleep(Duration::from_millis(pattern.on_ms)).await;
        if pattern.off_ms > 0 {
            indicator.set_level(false);
            sleep(Duration::from_millis(pattern.off_ms)).await;
        }
    }
}

/// Indicator that mirrors level changes into the log stream. Stands in
/// for a real LED on development hosts.
#[derive(Default)]
pub struct TraceIndicator {
    level: AtomicBool,
}

impl TraceIndicator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StatusIndicator for TraceIndicator {
    fn set_level(&self, on: bool) {
        if self.level.swap(on, Ordering::Relaxed) != on {
            tracing::trace!(on, "indicator");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_patterns_are_distinct() {
        let reject = alert_pattern(Alert::Reject);
        let rerecord = alert_pattern(Alert::Rerecord);
        let intervention = alert_pattern(Alert::UserIntervention);

        assert_eq!(reject.cycles, 3);
        assert_eq!(rerecord.cycles, 5);
        assert_eq!(intervention.cycles, 10);
        assert_ne!(reject, rerecord);
        assert_ne!(rerecord, intervention);
    }

    #[test]
    fn test_state_patterns() {
        // Idle blinks slowly, recording quickly.
        let idle = state_pattern(ClientState::Idle).unwrap();
        let recording = state_pattern(ClientState::Recording).unwrap();
        assert!(idle.off_ms > recording.off_ms);

        // Playing stays lit.
        let playing = state_pattern(ClientState::Playing).unwrap();
        assert_eq!(playing.off_ms, 0);

        // Dark states.
        assert!(state_pattern(ClientState::Booting).is_none());
        assert!(state_pattern(ClientState::Stalled).is_none());
        assert!(state_pattern(ClientState::Shutdown).is_none());
    }
}
