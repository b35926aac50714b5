//! Typing-indicator debouncing.
//!
//! Converts a rapid stream of local text-change events into one well-spaced
//! start/stop signal pair per burst, and converts received foreign typing
//! signals into a displayed boolean with an auto-expiry.
//!
//! Timers are spawned sleep tasks that post a [`TypingTick`] back to the
//! session mailbox. Each armed timer carries a generation number; a tick
//! whose generation no longer matches is stale (the timer was cancelled or
//! re-armed after the tick was queued) and has no effect.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Silence after the last local text change before a stop signal is sent.
pub const IDLE_TIMEOUT: Duration = Duration::from_millis(1000);
/// How long a received start signal keeps the indicator displayed without a
/// follow-up.
pub const EXPIRY_TIMEOUT: Duration = Duration::from_millis(3000);

/// Timer expirations delivered to the session mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypingTick {
    /// The local keystroke burst went idle.
    IdleElapsed(u64),
    /// The foreign indicator expired without a fresh signal.
    ExpiryElapsed(u64),
}

#[derive(Debug, Default)]
struct TimerSlot {
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl TimerSlot {
    /// Cancels any armed timer and returns the generation for the next one.
    fn rearm(&mut self) -> u64 {
        self.disarm();
        self.generation += 1;
        self.generation
    }

    fn disarm(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a delivered tick corresponds to the currently armed timer.
    fn matches(&self, generation: u64) -> bool {
        self.task.is_some() && self.generation == generation
    }

    fn is_armed(&self) -> bool {
        self.task.is_some()
    }
}

/// Two-sided typing debounce state machine.
#[derive(Debug)]
pub(crate) struct TypingDebouncer {
    idle_timeout: Duration,
    expiry_timeout: Duration,
    tick_tx: mpsc::UnboundedSender<TypingTick>,
    idle: TimerSlot,
    expiry: TimerSlot,
    peer_typing: bool,
}

impl TypingDebouncer {
    /// Creates a debouncer and the tick receiver the owning session selects
    /// on.
    pub fn new(
        idle_timeout: Duration,
        expiry_timeout: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<TypingTick>) {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        (
            Self {
                idle_timeout,
                expiry_timeout,
                tick_tx,
                idle: TimerSlot::default(),
                expiry: TimerSlot::default(),
                peer_typing: false,
            },
            tick_rx,
        )
    }

    /// Records a local text-change event.
    ///
    /// Returns `true` when this event starts a new burst and an
    /// `isTyping: true` signal should be sent. Always (re)arms the idle
    /// timer.
    pub fn note_local_activity(&mut self) -> bool {
        let starts_burst = !self.idle.is_armed();
        let generation = self.idle.rearm();
        let deadline = Instant::now() + self.idle_timeout;
        let tick_tx = self.tick_tx.clone();
        self.idle.task = Some(tokio::spawn(async move {
            sleep_until(deadline).await;
            let _ = tick_tx.send(TypingTick::IdleElapsed(generation));
        }));
        starts_burst
    }

    /// Handles an idle-timer tick.
    ///
    /// Returns `true` when the burst just ended and an `isTyping: false`
    /// signal should be sent; stale ticks return `false`.
    pub fn idle_elapsed(&mut self, generation: u64) -> bool {
        if !self.idle.matches(generation) {
            return false;
        }
        self.idle.disarm();
        true
    }

    /// Applies a received foreign typing signal.
    ///
    /// The displayed value always follows the signal: `true` (re)arms the
    /// expiry timer, an explicit `false` is authoritative and cancels it.
    /// Returns the new displayed value when it changed.
    pub fn observe_peer_signal(&mut self, is_typing: bool) -> Option<bool> {
        if is_typing {
            let generation = self.expiry.rearm();
            let deadline = Instant::now() + self.expiry_timeout;
            let tick_tx = self.tick_tx.clone();
            self.expiry.task = Some(tokio::spawn(async move {
                sleep_until(deadline).await;
                let _ = tick_tx.send(TypingTick::ExpiryElapsed(generation));
            }));
        } else {
            self.expiry.disarm();
        }

        let changed = self.peer_typing != is_typing;
        self.peer_typing = is_typing;
        changed.then_some(is_typing)
    }

    /// Handles an expiry-timer tick.
    ///
    /// Returns `Some(false)` when the displayed indicator just reverted;
    /// stale ticks return `None`.
    pub fn expiry_elapsed(&mut self, generation: u64) -> Option<bool> {
        if !self.expiry.matches(generation) {
            return None;
        }
        self.expiry.disarm();
        if !self.peer_typing {
            return None;
        }
        self.peer_typing = false;
        Some(false)
    }

    /// Cancels both timers and clears the displayed indicator.
    ///
    /// Returns `Some(false)` when the indicator was displayed and the UI
    /// should be told it cleared. Called on disconnect and transport failure.
    pub fn reset(&mut self) -> Option<bool> {
        self.idle.disarm();
        self.expiry.disarm();
        if !self.peer_typing {
            return None;
        }
        self.peer_typing = false;
        Some(false)
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.idle.disarm();
        self.expiry.disarm();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::{advance, Instant};

    use super::{TypingDebouncer, TypingTick, EXPIRY_TIMEOUT, IDLE_TIMEOUT};

    #[tokio::test(start_paused = true)]
    async fn burst_emits_one_start_and_one_stop_after_last_event() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);
        let start = Instant::now();

        assert!(debouncer.note_local_activity(), "first event starts burst");
        advance(Duration::from_millis(300)).await;
        assert!(!debouncer.note_local_activity());
        advance(Duration::from_millis(300)).await;
        assert!(!debouncer.note_local_activity());

        let tick = ticks.recv().await.expect("idle tick");
        let TypingTick::IdleElapsed(generation) = tick else {
            panic!("expected idle tick, got {tick:?}");
        };
        assert_eq!(Instant::now() - start, Duration::from_millis(1600));
        assert!(debouncer.idle_elapsed(generation), "burst ends exactly once");

        assert!(debouncer.note_local_activity(), "next event opens a new burst");
    }

    #[tokio::test(start_paused = true)]
    async fn rearmed_idle_timer_leaves_no_live_stale_tick() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);

        debouncer.note_local_activity();
        let first = ticks.recv().await.expect("first idle tick");
        let TypingTick::IdleElapsed(first_generation) = first else {
            panic!("expected idle tick");
        };

        // A fresh burst is armed before the queued tick is processed.
        debouncer.note_local_activity();
        assert!(
            !debouncer.idle_elapsed(first_generation),
            "tick from the previous burst must be stale"
        );

        let second = ticks.recv().await.expect("second idle tick");
        let TypingTick::IdleElapsed(second_generation) = second else {
            panic!("expected idle tick");
        };
        assert!(debouncer.idle_elapsed(second_generation));
    }

    #[tokio::test(start_paused = true)]
    async fn foreign_signal_expires_after_exactly_three_seconds() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);
        let start = Instant::now();

        assert_eq!(debouncer.observe_peer_signal(true), Some(true));
        let tick = ticks.recv().await.expect("expiry tick");
        let TypingTick::ExpiryElapsed(generation) = tick else {
            panic!("expected expiry tick, got {tick:?}");
        };
        assert_eq!(Instant::now() - start, Duration::from_millis(3000));
        assert_eq!(debouncer.expiry_elapsed(generation), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_foreign_signal_rearms_the_expiry() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);
        let start = Instant::now();

        assert_eq!(debouncer.observe_peer_signal(true), Some(true));
        advance(Duration::from_millis(1500)).await;
        assert_eq!(
            debouncer.observe_peer_signal(true),
            None,
            "repeat signal does not change the displayed value"
        );

        let tick = ticks.recv().await.expect("expiry tick");
        let TypingTick::ExpiryElapsed(generation) = tick else {
            panic!("expected expiry tick");
        };
        assert_eq!(
            Instant::now() - start,
            Duration::from_millis(4500),
            "expiry runs from the latest signal, not the first"
        );
        assert_eq!(debouncer.expiry_elapsed(generation), Some(false));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_stop_clears_immediately_and_cancels_expiry() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);

        assert_eq!(debouncer.observe_peer_signal(true), Some(true));
        assert_eq!(debouncer.observe_peer_signal(false), Some(false));

        let quiet = tokio::time::timeout(Duration::from_secs(10), ticks.recv()).await;
        assert!(quiet.is_err(), "no expiry tick after an authoritative stop");
    }

    #[tokio::test(start_paused = true)]
    async fn reset_cancels_timers_and_reports_cleared_indicator() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);

        debouncer.note_local_activity();
        debouncer.observe_peer_signal(true);
        assert_eq!(debouncer.reset(), Some(false));
        assert_eq!(debouncer.reset(), None, "reset is idempotent");

        let quiet = tokio::time::timeout(Duration::from_secs(10), ticks.recv()).await;
        assert!(quiet.is_err(), "cancelled timers never tick");
    }

    #[tokio::test(start_paused = true)]
    async fn tick_racing_a_cancel_becomes_a_no_op() {
        let (mut debouncer, mut ticks) = TypingDebouncer::new(IDLE_TIMEOUT, EXPIRY_TIMEOUT);

        debouncer.note_local_activity();
        let tick = ticks.recv().await.expect("idle tick");
        let TypingTick::IdleElapsed(generation) = tick else {
            panic!("expected idle tick");
        };

        // Disconnect-style cancellation lands before the queued tick is seen.
        debouncer.reset();
        assert!(!debouncer.idle_elapsed(generation));
    }
}
