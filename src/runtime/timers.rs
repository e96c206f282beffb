use std::time::{Duration, Instant};

use super::events::TimerKind;

/// Single-shot deadlines, at most one per kind. Periodic timers re-arm
/// themselves when they fire.
#[derive(Debug, Default)]
pub struct Timers {
    entries: Vec<(Instant, TimerKind)>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms `kind`, replacing any deadline it already had.
    pub fn schedule(&mut self, kind: TimerKind, delay: Duration) {
        self.schedule_at(kind, Instant::now() + delay);
    }

    pub fn schedule_at(&mut self, kind: TimerKind, deadline: Instant) {
        self.cancel(kind);
        self.entries.push((deadline, kind));
    }

    pub fn cancel(&mut self, kind: TimerKind) {
        self.entries.retain(|(_, k)| *k != kind);
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.entries.iter().any(|(_, k)| *k == kind)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(deadline, _)| *deadline).min()
    }

    /// Removes and returns every timer due at `now`, earliest first.
    pub fn take_expired(&mut self, now: Instant) -> Vec<TimerKind> {
        let mut due: Vec<(Instant, TimerKind)> = Vec::new();
        self.entries.retain(|entry| {
            if entry.0 <= now {
                due.push(*entry);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(deadline, _)| *deadline);
        due.into_iter().map(|(_, kind)| kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_deadline() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.schedule_at(TimerKind::BackendRetry, now + Duration::from_secs(5));
        timers.schedule_at(TimerKind::BackendRetry, now + Duration::from_secs(1));
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(1)));
        assert!(timers.take_expired(now).is_empty());
        assert_eq!(timers.take_expired(now + Duration::from_secs(1)), vec![TimerKind::BackendRetry]);
        assert!(!timers.is_scheduled(TimerKind::BackendRetry));
    }

    #[test]
    fn expired_timers_come_out_in_order() {
        let mut timers = Timers::new();
        let now = Instant::now();
        timers.schedule_at(TimerKind::BackendRetry, now + Duration::from_millis(50));
        timers.schedule_at(TimerKind::StreamReconnect, now + Duration::from_millis(10));
        assert_eq!(
            timers.take_expired(now + Duration::from_secs(1)),
            vec![TimerKind::StreamReconnect, TimerKind::BackendRetry]
        );
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn cancel_removes_only_that_kind() {
        let mut timers = Timers::new();
        timers.schedule(TimerKind::BackendRetry, Duration::from_secs(5));
        timers.schedule(TimerKind::StreamReconnect, Duration::from_secs(1));
        timers.cancel(TimerKind::BackendRetry);
        assert!(!timers.is_scheduled(TimerKind::BackendRetry));
        assert!(timers.is_scheduled(TimerKind::StreamReconnect));
    }
}
