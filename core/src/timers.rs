//! Countdown timers
//!
//! Timers are split in two halves:
//!
//! - [`RunningTimer`] lives inside the session and holds the remaining units.
//!   It only accepts ticks carrying its own [`TimerToken`].
//! - [`TickScheduler`] lives in the driver and turns wall-clock time into
//!   ticks. It never decides when a timer is finished.
//!
//! Every token carries the session generation at the time the timer started.
//! The session bumps its generation on every timer start and every reset, so a
//! tick from a timer that was replaced or cancelled can never match.

use std::time::{Duration, Instant};

use smallvec::SmallVec;

/// Which clock a timer drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Pre-match countdown
    Countdown,
    /// Match clock
    Match,
    /// Rematch cool-down after a result
    Cooldown,
}

/// Scheduler slot. Countdown and match clock share one slot so starting
/// either replaces the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSlot {
    Clock,
    Cooldown,
}

impl TimerKind {
    pub fn slot(self) -> TimerSlot {
        match self {
            Self::Countdown | Self::Match => TimerSlot::Clock,
            Self::Cooldown => TimerSlot::Cooldown,
        }
    }
}

/// Identity of one started timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

/// Result of applying a tick to a [`RunningTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Still running with this many units left
    Running(u32),
    /// Reached zero on this tick
    Expired,
}

/// A countdown owned by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningTimer {
    token: TimerToken,
    remaining: u32,
}

impl RunningTimer {
    pub fn new(token: TimerToken, duration: u32) -> Self {
        Self {
            token,
            remaining: duration,
        }
    }

    pub fn token(&self) -> TimerToken {
        self.token
    }

    pub fn kind(&self) -> TimerKind {
        self.token.kind
    }

    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    /// Apply one tick. Returns `None` if the token belongs to another timer.
    pub fn tick(&mut self, token: TimerToken) -> Option<Tick> {
        if token != self.token {
            return None;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            Some(Tick::Expired)
        } else {
            Some(Tick::Running(self.remaining))
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    token: TimerToken,
    next_at: Instant,
}

/// Periodic tick source driven by the caller's clock.
#[derive(Debug)]
pub struct TickScheduler {
    interval: Duration,
    entries: SmallVec<[Scheduled; 2]>,
}

/// Shortest interval the scheduler will tick at.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl TickScheduler {
    /// Intervals below one millisecond are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
            entries: SmallVec::new(),
        }
    }

    /// Start ticking `token`, replacing whatever occupied its slot.
    pub fn start(&mut self, token: TimerToken, now: Instant) {
        let slot = token.kind.slot();
        self.entries.retain(|e| e.token.kind.slot() != slot);
        self.entries.push(Scheduled {
            token,
            next_at: now + self.interval,
        });
        tracing::trace!(?token, "Timer scheduled");
    }

    /// Stop ticking `token`. Unknown tokens are ignored.
    pub fn stop(&mut self, token: TimerToken) {
        self.entries.retain(|e| e.token != token);
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_idle(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending tick, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|e| e.next_at).min()
    }

    /// Collect every tick due at `now`, oldest first.
    ///
    /// A caller that fell behind gets one tick per elapsed interval.
    pub fn poll(&mut self, now: Instant) -> Vec<TimerToken> {
        let mut due: Vec<(Instant, TimerToken)> = Vec::new();
        for entry in &mut self.entries {
            while entry.next_at <= now {
                due.push((entry.next_at, entry.token));
                entry.next_at += self.interval;
            }
        }
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, token)| token).collect()
    }
}
