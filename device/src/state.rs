use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;

use crate::clock::{ClockState, Date, TimeOfDay};
use crate::command::EmployeeId;

/// Outcome of applying a valid date from a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateSync {
    /// No date was stored yet. The counter is kept.
    FirstSync,
    /// A synced date changed. The counter restarted from 0.
    NewDay,
    Unchanged,
}

/// What a command changed, for the diagnostics sent back to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub time: Option<TimeOfDay>,
    pub date: Option<DateSync>,
    /// Counter value after the check-in, if one happened.
    pub count: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub time: TimeOfDay,
    pub date: Option<Date>,
    pub count: u16,
}

struct Shared {
    clock: ClockState,
    count: u16,
    pending_check_in: Option<EmployeeId>,
}

/// State shared between the receive interrupt, the tick interrupt and the
/// display loop.
///
/// Every multi-field update runs inside a single critical section, so a tick
/// never sees a half-applied command and the display never renders a torn
/// clock. The refresh flag is a lone atomic: setting it many times between
/// two renders yields one render of the latest state.
pub struct DeviceState {
    shared: Mutex<RefCell<Shared>>,
    refresh: AtomicBool,
}

impl DeviceState {
    /// Count 0, date not synced, clock at 00:00:00.
    pub const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared {
                clock: ClockState::new(),
                count: 0,
                pending_check_in: None,
            })),
            refresh: AtomicBool::new(false),
        }
    }

    /// One second elapsed.
    pub fn tick(&self) {
        critical_section::with(|cs| self.shared.borrow_ref_mut(cs).clock.time.tick());
        self.request_refresh();
    }

    /// Applies the parsed fields of one command atomically.
    ///
    /// A date that differs from an already-synced date resets the counter
    /// before the check-in increment, so the first visitor of a new day
    /// leaves the counter at 1.
    pub fn apply(&self, time: Option<(u8, u8)>, date: Option<Date>, check_in: Option<EmployeeId>) -> Applied {
        let applied = critical_section::with(|cs| {
            let mut shared = self.shared.borrow_ref_mut(cs);

            let time = time.map(|(hours, minutes)| {
                shared.clock.time.set(hours, minutes);
                shared.clock.time
            });

            let stored = shared.clock.date;
            let date = date.map(|date| match stored {
                None => {
                    shared.clock.date = Some(date);
                    DateSync::FirstSync
                }
                Some(stored) if stored != date => {
                    shared.clock.date = Some(date);
                    shared.count = 0;
                    DateSync::NewDay
                }
                Some(_) => DateSync::Unchanged,
            });

            let count = check_in.map(|id| {
                shared.count = shared.count.saturating_add(1);
                shared.pending_check_in = Some(id);
                shared.count
            });

            Applied { time, date, count }
        });

        if applied.time.is_some() || matches!(applied.date, Some(DateSync::FirstSync | DateSync::NewDay)) {
            self.request_refresh();
        }
        applied
    }

    /// Hands the most recent check-in to the display loop. Check-ins that
    /// arrive while one is pending replace it.
    pub fn take_pending_check_in(&self) -> Option<EmployeeId> {
        critical_section::with(|cs| self.shared.borrow_ref_mut(cs).pending_check_in.take())
    }

    pub fn snapshot(&self) -> Snapshot {
        critical_section::with(|cs| {
            let shared = self.shared.borrow_ref(cs);
            Snapshot {
                time: shared.clock.time,
                date: shared.clock.date,
                count: shared.count,
            }
        })
    }

    pub fn request_refresh(&self) {
        self.refresh.store(true, Ordering::Release);
    }

    /// Clears the flag and reports whether it was set.
    pub fn take_refresh(&self) -> bool {
        self.refresh.swap(false, Ordering::AcqRel)
    }
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}
