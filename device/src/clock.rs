/// Time of day kept by the tick source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TimeOfDay {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
}

impl TimeOfDay {
    pub const fn midnight() -> Self {
        Self { hours: 0, minutes: 0, seconds: 0 }
    }

    /// Advance one second, carrying into minutes and hours and wrapping at 24h.
    pub fn tick(&mut self) {
        self.seconds += 1;
        if self.seconds >= 60 {
            self.seconds = 0;
            self.minutes += 1;
            if self.minutes >= 60 {
                self.minutes = 0;
                self.hours += 1;
                if self.hours >= 24 {
                    self.hours = 0;
                }
            }
        }
    }

    /// External time set. Seconds always restart from zero, even when the
    /// minute is unchanged.
    pub fn set(&mut self, hours: u8, minutes: u8) {
        self.hours = hours;
        self.minutes = minutes;
        self.seconds = 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

/// Clock as owned by the device: time always runs, the date only exists once
/// a host has synced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockState {
    pub time: TimeOfDay,
    pub date: Option<Date>,
}

impl ClockState {
    pub const fn new() -> Self {
        Self {
            time: TimeOfDay::midnight(),
            date: None,
        }
    }

    pub fn date_synced(&self) -> bool {
        self.date.is_some()
    }
}
