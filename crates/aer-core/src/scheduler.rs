//! Wake scheduler: one repeating report timer plus an asynchronous
//! downlink wake source sharing a single signal.
//!
//! The signal is latest-wins and does not queue. If a timer tick and a
//! downlink land between two wakes, only one [`EventKind`] tag survives,
//! so consumers must re-check both the timer-due flag and the downlink
//! inbox on every wake instead of trusting the tag alone.

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Ticker};
use log::debug;

/// Why the node woke up. Informational only; see the module docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The repeating report timer fired.
    TimerTick,
    /// A downlink landed in the inbox.
    Downlink,
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    /// Before the first successful join; the report timer is not running.
    Idle = 0,
    /// Report timer running, no unconsumed wake.
    Armed = 1,
    /// A wake has been raised and not yet consumed.
    Fired = 2,
}

const IDLE: u8 = SchedulerState::Idle as u8;
const ARMED: u8 = SchedulerState::Armed as u8;
const FIRED: u8 = SchedulerState::Fired as u8;

/// Single wake source for the orchestrator.
///
/// Const-constructible so it can live in a `static` shared between the
/// orchestrator, the ticker task and the radio event context.
pub struct WakeScheduler {
    signal: Signal<CriticalSectionRawMutex, EventKind>,
    start: Signal<CriticalSectionRawMutex, ()>,
    state: AtomicU8,
    timer_due: AtomicBool,
    period: Duration,
}

impl WakeScheduler {
    pub const fn new(period: Duration) -> Self {
        Self {
            signal: Signal::new(),
            start: Signal::new(),
            state: AtomicU8::new(IDLE),
            timer_due: AtomicBool::new(false),
            period,
        }
    }

    pub fn state(&self) -> SchedulerState {
        match self.state.load(Ordering::Acquire) {
            IDLE => SchedulerState::Idle,
            ARMED => SchedulerState::Armed,
            _ => SchedulerState::Fired,
        }
    }

    /// Start the repeating report timer. Idempotent: only the first call
    /// after boot transitions Idle -> Armed and releases the ticker loop;
    /// returns whether this call did the arming.
    pub fn arm(&self) -> bool {
        let armed = self
            .state
            .compare_exchange(IDLE, ARMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if armed {
            self.start.signal(());
        }
        armed
    }

    /// Raise a wake. For [`EventKind::TimerTick`] the timer-due flag is set
    /// before the signal so it is visible to whoever consumes the wake.
    pub fn raise(&self, kind: EventKind) {
        if kind == EventKind::TimerTick {
            self.timer_due.store(true, Ordering::Release);
        }
        let _ = self
            .state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire);
        self.signal.signal(kind);
    }

    /// Suspend until a wake is raised, returning the latest tag.
    pub async fn wait(&self) -> EventKind {
        let kind = self.signal.wait().await;
        let _ = self
            .state
            .compare_exchange(FIRED, ARMED, Ordering::AcqRel, Ordering::Acquire);
        kind
    }

    /// Non-blocking variant of [`WakeScheduler::wait`].
    pub fn try_wait(&self) -> Option<EventKind> {
        let kind = self.signal.try_take()?;
        let _ = self
            .state
            .compare_exchange(FIRED, ARMED, Ordering::AcqRel, Ordering::Acquire);
        Some(kind)
    }

    /// Consume the timer-due flag. Checked on every wake regardless of the
    /// tag the wake carried.
    pub fn take_timer_due(&self) -> bool {
        self.timer_due.swap(false, Ordering::AcqRel)
    }

    /// Ticker loop body: spawn this as its own task. Blocks until the
    /// scheduler is armed by the first successful join, then raises a
    /// timer wake every period, forever.
    pub async fn run(&self) -> ! {
        self.start.wait().await;
        debug!("report timer started, period {} ms", self.period.as_millis());
        let mut ticker = Ticker::every(self.period);
        loop {
            ticker.next().await;
            self.raise(EventKind::TimerTick);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler() -> WakeScheduler {
        WakeScheduler::new(Duration::from_millis(60_000))
    }

    #[test]
    fn arming_is_idempotent() {
        let s = scheduler();
        assert_eq!(s.state(), SchedulerState::Idle);
        assert!(s.arm());
        assert_eq!(s.state(), SchedulerState::Armed);
        // A second (erroneous) arm must not re-trigger anything.
        assert!(!s.arm());
        assert_eq!(s.state(), SchedulerState::Armed);
    }

    #[test]
    fn timer_tick_sets_due_flag() {
        let s = scheduler();
        s.arm();
        s.raise(EventKind::TimerTick);
        assert_eq!(s.state(), SchedulerState::Fired);
        assert_eq!(s.try_wait(), Some(EventKind::TimerTick));
        assert_eq!(s.state(), SchedulerState::Armed);
        assert!(s.take_timer_due());
        // Flag is consumed.
        assert!(!s.take_timer_due());
    }

    #[test]
    fn downlink_wake_leaves_timer_flag_clear() {
        let s = scheduler();
        s.arm();
        s.raise(EventKind::Downlink);
        assert_eq!(s.try_wait(), Some(EventKind::Downlink));
        assert!(!s.take_timer_due());
    }

    #[test]
    fn coalesced_wakes_keep_latest_tag_but_both_conditions() {
        let s = scheduler();
        s.arm();
        s.raise(EventKind::TimerTick);
        s.raise(EventKind::Downlink);
        // Only the latest tag survives on the signal...
        assert_eq!(s.try_wait(), Some(EventKind::Downlink));
        assert_eq!(s.try_wait(), None);
        // ...but the timer-due flag still records the earlier tick.
        assert!(s.take_timer_due());
    }
}
