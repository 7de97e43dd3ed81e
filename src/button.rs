//! Button worker
//!
//! Polls a debounced digital input and turns edges into gestures: short
//! press toggles recording, double press triggers a camera capture, long
//! press forces shutdown. Timing windows are tuned against human motor
//! control and must not change: 50 ms debounce, 300 ms double-press
//! window, 1200 ms long press.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use crate::constants::{BUTTON_POLL_MS, DEBOUNCE_MS, DOUBLE_PRESS_WINDOW_MS, LONG_PRESS_MS};
use crate::context::AppContext;
use crate::state::ClientState;

/// External digital input, polled every 10 ms.
pub trait ButtonInput: Send + Sync {
    /// Current raw level; `true` while physically pressed.
    fn is_pressed(&self) -> bool;
}

/// Recognized gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressEvent {
    Short,
    Double,
    Long,
}

/// Pure edge/timing tracker, fed one `(level, now)` sample per poll tick.
///
/// Kept free of I/O so the timing logic is testable with a synthetic
/// clock.
pub struct PressTracker {
    last_debounce: Instant,
    press_count: u8,
    last_press: Option<Instant>,
    long_press_start: Option<Instant>,
    long_press_fired: bool,
}

impl PressTracker {
    pub fn new(now: Instant) -> Self {
        Self {
            last_debounce: now,
            press_count: 0,
            last_press: None,
            long_press_start: None,
            long_press_fired: false,
        }
    }

    pub fn update(&mut self, pressed: bool, now: Instant) -> Option<PressEvent> {
        let debounce = Duration::from_millis(DEBOUNCE_MS);
        let double_window = Duration::from_millis(DOUBLE_PRESS_WINDOW_MS);
        let long_press = Duration::from_millis(LONG_PRESS_MS);

        if pressed {
            if !self.long_press_fired && now.duration_since(self.last_debounce) > debounce {
                let start = *self.long_press_start.get_or_insert(now);
                if now.duration_since(start) >= long_press {
                    self.long_press_fired = true;
                    return Some(PressEvent::Long);
                }
            }
        } else {
            if self.long_press_start.is_some()
                && !self.long_press_fired
                && now.duration_since(self.last_debounce) > debounce
            {
                self.last_debounce = now;
                match (self.press_count, self.last_press) {
                    (1, Some(prev)) if now.duration_since(prev) < double_window => {
                        self.press_count = 0;
                        self.last_press = None;
                        self.long_press_start = None;
                        return Some(PressEvent::Double);
                    }
                    _ => {
                        self.press_count = 1;
                        self.last_press = Some(now);
                    }
                }
            }
            self.long_press_start = None;
            self.long_press_fired = false;
        }

        // A lone press matures into a short press once the double-press
        // window closes.
        if self.press_count == 1 {
            if let Some(prev) = self.last_press {
                if now.duration_since(prev) >= double_window {
                    self.press_count = 0;
                    self.last_press = None;
                    return Some(PressEvent::Short);
                }
            }
        }

        None
    }
}

/// Button worker loop. Runs until shutdown.
pub async fn run(ctx: Arc<AppContext>, input: Arc<dyn ButtonInput>) {
    tracing::info!("button worker started");
    let mut tracker = PressTracker::new(Instant::now());

    while !ctx.state.is_shutdown() {
        match tracker.update(input.is_pressed(), Instant::now()) {
            Some(PressEvent::Short) => handle_short(&ctx).await,
            Some(PressEvent::Double) => handle_double(&ctx).await,
            Some(PressEvent::Long) => {
                tracing::info!("long press detected, initiating shutdown");
                if ctx.state.snapshot() == ClientState::Recording {
                    // Drain the recording session before going down.
                    ctx.state.set(ClientState::Processing).await;
                }
                ctx.state.set(ClientState::Shutdown).await;
            }
            None => {}
        }
        sleep(Duration::from_millis(BUTTON_POLL_MS)).await;
    }
    tracing::info!("button worker stopped");
}

async fn handle_short(ctx: &AppContext) {
    match ctx.state.snapshot() {
        ClientState::Idle => ctx.state.set(ClientState::Recording).await,
        ClientState::Recording => ctx.state.set(ClientState::Processing).await,
        _ => ctx.send_reject().await,
    }
}

async fn handle_double(ctx: &AppContext) {
    if ctx.state.snapshot() == ClientState::Idle {
        ctx.state.set(ClientState::CameraCapture).await;
        ctx.camera_wake.notify_one();
    } else {
        ctx.send_reject().await;
    }
}

/// Software-driven button level, for hosts without a GPIO button and for
/// tests.
#[derive(Default)]
pub struct VirtualButton {
    pressed: AtomicBool,
}

impl VirtualButton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pressed(&self, pressed: bool) {
        self.pressed.store(pressed, Ordering::Release);
    }

    /// Emit `count` presses of `hold` duration, `gap` apart. Blocks the
    /// calling thread; meant for console-input threads.
    pub fn pulse_blocking(&self, hold: Duration, count: u32, gap: Duration) {
        for _ in 0..count {
            self.set_pressed(true);
            std::thread::sleep(hold);
            self.set_pressed(false);
            std::thread::sleep(gap);
        }
    }
}

impl ButtonInput for VirtualButton {
    fn is_pressed(&self) -> bool {
        self.pressed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed the tracker a constant level for `ms`, stepping the synthetic
    /// clock in 10 ms poll ticks.
    fn drive(
        tracker: &mut PressTracker,
        now: &mut Instant,
        pressed: bool,
        ms: u64,
    ) -> Vec<PressEvent> {
        let mut events = Vec::new();
        for _ in 0..ms / 10 {
            *now += Duration::from_millis(10);
            if let Some(event) = tracker.update(pressed, *now) {
                events.push(event);
            }
        }
        events
    }

    #[test]
    fn test_short_press() {
        let mut now = Instant::now();
        let mut tracker = PressTracker::new(now);

        // Settle past the initial debounce window.
        assert!(drive(&mut tracker, &mut now, false, 100).is_empty());

        assert!(drive(&mut tracker, &mut now, true, 80).is_empty());
        let events = drive(&mut tracker, &mut now, false, 400);
        assert_eq!(events, vec![PressEvent::Short]);
    }

    #[test]
    fn test_double_press_within_window() {
        let mut now = Instant::now();
        let mut tracker = PressTracker::new(now);
        drive(&mut tracker, &mut now, false, 100);

        drive(&mut tracker, &mut now, true, 80);
        assert!(drive(&mut tracker, &mut now, false, 150).is_empty());
        drive(&mut tracker, &mut now, true, 80);
        let events = drive(&mut tracker, &mut now, false, 100);
        assert_eq!(events, vec![PressEvent::Double]);

        // No trailing short press from the same gesture.
        assert!(drive(&mut tracker, &mut now, false, 500).is_empty());
    }

    #[test]
    fn test_two_slow_presses_are_two_shorts() {
        let mut now = Instant::now();
        let mut tracker = PressTracker::new(now);
        drive(&mut tracker, &mut now, false, 100);

        drive(&mut tracker, &mut now, true, 80);
        let events = drive(&mut tracker, &mut now, false, 400);
        assert_eq!(events, vec![PressEvent::Short]);

        drive(&mut tracker, &mut now, true, 80);
        let events = drive(&mut tracker, &mut now, false, 400);
        assert_eq!(events, vec![PressEvent::Short]);
    }

    #[test]
    fn test_long_press_fires_once_while_held() {
        let mut now = Instant::now();
        let mut tracker = PressTracker::new(now);
        drive(&mut tracker, &mut now, false, 100);

        let events = drive(&mut tracker, &mut now, true, 1500);
        assert_eq!(events, vec![PressEvent::Long]);

        // Release after a long press is not a short press.
        assert!(drive(&mut tracker, &mut now, false, 500).is_empty());
    }
}
