/// # scheduler
///
/// Host-side repeating tick. The scheduler never runs anything itself: the
/// owner asks it for due ticks with the current time and acts on them, so
/// it works the same inside a blocking event loop and inside a test that
/// makes up its own instants.
///
/// At most one timer exists. Every timer gets a fresh `TimerId`; a tick
/// stamped with any id other than the live one is stale and gets dropped.
use std::time::{Duration, Instant};

use log::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// One due tick of a particular timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub timer: TimerId,
    pub seq: u64,
}

struct ActiveTimer {
    id: TimerId,
    next_deadline: Instant,
    seq: u64,
}

pub struct Scheduler {
    period: Duration,
    active: Option<ActiveTimer>,
    next_id: u64,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Scheduler {
            period,
            active: None,
            next_id: 0,
        }
    }

    /// period for `rate_hz` ticks a second; callers validate `rate_hz > 0`
    pub fn with_rate(rate_hz: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / rate_hz))
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        match self.active {
            Some(_) => SchedulerState::Running,
            None => SchedulerState::Stopped,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Start ticking one period from `now`. Starting while already running
    /// replaces the live timer rather than adding a second one.
    pub fn start(&mut self, now: Instant) -> TimerId {
        if let Some(old) = self.stop() {
            warn!("scheduler started while running; replaced timer {:?}", old);
        }
        self.next_id += 1;
        let id = TimerId(self.next_id);
        self.active = Some(ActiveTimer {
            id,
            next_deadline: now + self.period,
            seq: 0,
        });
        debug!("scheduler started timer {:?} every {:?}", id, self.period);
        id
    }

    /// Cancel the live timer, returning its id. No-op when stopped. Once
    /// this returns, `poll` yields nothing until the next `start`.
    pub fn stop(&mut self) -> Option<TimerId> {
        let old = self.active.take()?;
        debug!("scheduler stopped timer {:?} after {} ticks", old.id, old.seq);
        Some(old.id)
    }

    /// whether a tick stamped with `timer` may still run
    pub fn is_current(&self, timer: TimerId) -> bool {
        self.active.as_ref().map(|a| a.id) == Some(timer)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|a| a.next_deadline)
    }

    /// time left before the next tick is due, zero if it's overdue
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Return the due tick, if any. Missed periods are not replayed: a
    /// host that fell behind gets one tick and the cadence restarts from
    /// `now`.
    pub fn poll(&mut self, now: Instant) -> Option<Tick> {
        let period = self.period;
        let active = self.active.as_mut()?;
        if now < active.next_deadline {
            return None;
        }
        active.seq += 1;
        active.next_deadline += period;
        if active.next_deadline <= now {
            active.next_deadline = now + period;
        }
        Some(Tick {
            timer: active.id,
            seq: active.seq,
        })
    }
}
