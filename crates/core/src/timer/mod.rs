use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What a pending timer is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    Reconnect,
    BufferRecovery,
}

/// Handle of one scheduled timer. Ids are never reused, so a token that fires
/// after it was cancelled is recognisably stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub id: u64,
}

/// Host-provided one-shot timers. When a timer elapses the host hands its
/// token back to [`crate::PlaybackController::handle_timer`].
pub trait TimerHost {
    fn schedule(&mut self, token: TimerToken, delay: Duration);
    fn cancel(&mut self, token: TimerToken);
}

impl<T: TimerHost + ?Sized> TimerHost for &mut T {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        (**self).schedule(token, delay);
    }

    fn cancel(&mut self, token: TimerToken) {
        (**self).cancel(token);
    }
}

/// Deterministic timer queue for hosts that drive time themselves.
#[derive(Debug, Default, Clone)]
pub struct ManualTimers {
    now: Duration,
    pending: Vec<(Duration, TimerToken)>,
}

impl ManualTimers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn pending(&self) -> impl Iterator<Item = &TimerToken> {
        self.pending.iter().map(|(_, token)| token)
    }

    pub fn pending_of(&self, kind: TimerKind) -> usize {
        self.pending().filter(|token| token.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Moves the clock forward and returns the tokens that came due, earliest
    /// deadline first.
    pub fn advance(&mut self, delta: Duration) -> Vec<TimerToken> {
        self.now += delta;
        let now = self.now;
        let mut due: Vec<(Duration, TimerToken)> = Vec::new();
        self.pending.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(deadline, token)| (*deadline, token.id));
        due.into_iter().map(|(_, token)| token).collect()
    }
}

impl TimerHost for ManualTimers {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.pending.push((self.now + delay, token));
    }

    fn cancel(&mut self, token: TimerToken) {
        self.pending.retain(|(_, pending)| *pending != token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(kind: TimerKind, id: u64) -> TimerToken {
        TimerToken { kind, id }
    }

    #[test]
    fn fires_in_deadline_order() {
        let mut timers = ManualTimers::new();
        timers.schedule(token(TimerKind::Reconnect, 1), Duration::from_millis(300));
        timers.schedule(token(TimerKind::BufferRecovery, 2), Duration::from_millis(100));

        assert!(timers.advance(Duration::from_millis(50)).is_empty());
        let due = timers.advance(Duration::from_millis(300));
        assert_eq!(due.iter().map(|t| t.id).collect::<Vec<_>>(), vec![2, 1]);
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timers_never_fire() {
        let mut timers = ManualTimers::new();
        let reconnect = token(TimerKind::Reconnect, 7);
        timers.schedule(reconnect, Duration::from_secs(1));
        assert_eq!(timers.pending_of(TimerKind::Reconnect), 1);

        timers.cancel(reconnect);
        assert!(timers.advance(Duration::from_secs(5)).is_empty());
        assert_eq!(timers.now(), Duration::from_secs(5));
    }
}
