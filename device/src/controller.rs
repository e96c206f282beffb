use core::fmt::Write;

use embedded_hal::delay::DelayNs;

use crate::command::{parse_command, FieldError};
use crate::display::{draw_check_in, draw_idle_layout, draw_status, TextDisplay};
use crate::line::{LineAssembler, LineEvent};
use crate::state::{DateSync, DeviceState};

/// UART line buffer size in bytes.
pub const LINE_CAPACITY: usize = 128;

/// How long the check-in banner stays on the panel.
pub const CHECK_IN_DWELL_MS: u32 = 2000;

pub const BOOT_BANNER: &str = "System Initialized\r\n";

/// Decodes a received line, replacing each invalid UTF-8 sequence with `?`
/// so the ASCII fields around it still parse.
fn lossy_line(bytes: &[u8]) -> heapless::String<LINE_CAPACITY> {
    let mut text = heapless::String::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        match core::str::from_utf8(rest) {
            Ok(valid) => {
                let _ = text.push_str(valid);
                break;
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                // Checked by from_utf8 above
                let _ = text.push_str(core::str::from_utf8(valid).unwrap_or_default());
                let _ = text.push('?');
                let skip = e.error_len().unwrap_or(after.len());
                rest = &after[skip..];
            }
        }
    }
    text
}

/// Receive-interrupt side. Owns the line buffer; everything it changes in
/// [`DeviceState`] goes through a single [`DeviceState::apply`] call.
///
/// UART writes are best effort: a failed diagnostic is dropped.
pub struct CommandReceiver<'a> {
    state: &'a DeviceState,
    line: LineAssembler<LINE_CAPACITY>,
}

impl<'a> CommandReceiver<'a> {
    pub const fn new(state: &'a DeviceState) -> Self {
        Self {
            state,
            line: LineAssembler::new(),
        }
    }

    pub fn announce<W: Write>(&self, tx: &mut W) {
        let _ = tx.write_str(BOOT_BANNER);
    }

    pub fn on_byte<W: Write>(&mut self, byte: u8, tx: &mut W) {
        match self.line.push(byte) {
            LineEvent::Pending => {}
            LineEvent::Overflow => {
                let _ = tx.write_str("RX Buffer Overflow!\r\n");
            }
            LineEvent::Complete => {
                let line = self.line.take_line();
                let text = lossy_line(&line);
                self.handle_line(&text, tx);
            }
        }
    }

    pub fn handle_line<W: Write>(&self, line: &str, tx: &mut W) {
        let Some(cmd) = parse_command(line) else {
            let _ = tx.write_str("Not 'Hello STM32' command.\r\n");
            return;
        };
        let _ = write!(tx, "CMD RX: {}\r\n", line);

        match cmd.id {
            Ok(_) => {}
            Err(FieldError::TagMissing) => {
                let _ = tx.write_str("'id:' tag not found.\r\n");
            }
            Err(_) => {
                let _ = tx.write_str("Invalid ID length.\r\n");
            }
        }

        let applied = self.state.apply(cmd.time.ok(), cmd.date.ok(), cmd.id.clone().ok());

        match (cmd.time, applied.time) {
            (Ok(_), Some(time)) => {
                let _ = write!(tx, "Time Sync: {:02}:{:02}\r\n", time.hours, time.minutes);
            }
            (Err(FieldError::TagMissing), _) => {
                let _ = tx.write_str("'time:' tag not found.\r\n");
            }
            (Err(FieldError::OutOfRange), _) => {
                let _ = tx.write_str("Invalid time value parsed.\r\n");
            }
            _ => {
                let _ = tx.write_str("Time format parsing failed.\r\n");
            }
        }

        match cmd.date {
            Ok(date) => {
                let _ = write!(tx, "Date Parsed: {}-{:02}-{:02}\r\n", date.year, date.month, date.day);
                let note = match applied.date {
                    Some(DateSync::FirstSync) => "First date sync.\r\n",
                    Some(DateSync::NewDay) => "New day detected! Resetting count.\r\n",
                    _ => "Date is the same.\r\n",
                };
                let _ = tx.write_str(note);
            }
            Err(FieldError::TagMissing) => {
                let _ = tx.write_str("'date:' tag not found.\r\n");
            }
            Err(FieldError::OutOfRange) => {
                let _ = tx.write_str("Invalid date value parsed.\r\n");
            }
            Err(_) => {
                let _ = tx.write_str("Date format parsing failed.\r\n");
            }
        }

        if applied.count.is_some() {
            let _ = tx.write_str("Simulating Door Open...\r\n");
            let _ = tx.write_str("OK: Door Open\r\n");
        } else {
            let _ = tx.write_str("No valid ID found. Check-in aborted.\r\n");
        }
    }
}

/// Main-loop side: renders the panel whenever the refresh flag is set and
/// runs the check-in banner dwell. The dwell blocks only this loop; ticks and
/// received commands keep landing in [`DeviceState`] meanwhile.
pub struct DisplayRefresher<'a, D, T> {
    state: &'a DeviceState,
    display: D,
    delay: T,
}

impl<'a, D: TextDisplay, T: DelayNs> DisplayRefresher<'a, D, T> {
    pub fn new(state: &'a DeviceState, display: D, delay: T) -> Self {
        Self { state, display, delay }
    }

    /// Boot screen: idle layout filled with the current state.
    pub fn start(&mut self) {
        draw_idle_layout(&mut self.display);
        draw_status(&mut self.display, &self.state.snapshot());
    }

    /// One pass of the polling loop. Returns whether the panel was redrawn.
    pub fn poll(&mut self) -> bool {
        let mut drawn = false;

        if let Some(id) = self.state.take_pending_check_in() {
            draw_check_in(&mut self.display, &id);
            self.delay.delay_ms(CHECK_IN_DWELL_MS);
            draw_idle_layout(&mut self.display);
            self.state.request_refresh();
            drawn = true;
        }

        if self.state.take_refresh() {
            draw_status(&mut self.display, &self.state.snapshot());
            drawn = true;
        }

        drawn
    }

    pub fn display(&self) -> &D {
        &self.display
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Date, TimeOfDay};
    use crate::display::testing::GridDisplay;

    #[derive(Default)]
    struct RecordingDelay {
        waits_ms: Vec<u32>,
    }

    impl DelayNs for RecordingDelay {
        fn delay_ns(&mut self, _ns: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            self.waits_ms.push(ms);
        }
    }

    fn send(rx: &mut CommandReceiver<'_>, bytes: &[u8]) -> String {
        let mut tx = String::new();
        for &b in bytes {
            rx.on_byte(b, &mut tx);
        }
        tx
    }

    #[test]
    fn first_check_in_syncs_date_without_reset() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);

        let tx = send(&mut rx, b"Hello STM32,id:42,time:09:05,date:2024-01-02\n");
        assert!(tx.starts_with("CMD RX: Hello STM32,id:42"));
        assert!(tx.contains("Time Sync: 09:05\r\n"));
        assert!(tx.contains("Date Parsed: 2024-01-02\r\n"));
        assert!(tx.contains("First date sync.\r\n"));
        assert!(!tx.contains("Resetting count"));
        assert!(tx.contains("Simulating Door Open...\r\n"));
        assert!(tx.contains("OK: Door Open\r\n"));

        let snap = state.snapshot();
        assert_eq!(snap.count, 1);
        assert_eq!(snap.date, Some(Date { year: 2024, month: 1, day: 2 }));
        assert_eq!(snap.time, TimeOfDay { hours: 9, minutes: 5, seconds: 0 });

        let mut refresher = DisplayRefresher::new(&state, GridDisplay::new(), RecordingDelay::default());
        assert!(refresher.poll());
        assert_eq!(refresher.delay.waits_ms, vec![CHECK_IN_DWELL_MS]);
        assert_eq!(refresher.display().clears, 2);
        assert_eq!(refresher.display().row(1), "Attendance Sys");
        assert_eq!(refresher.display().row(2), "Count:001");
        assert_eq!(refresher.display().row(3), "Date:01-02 24");
        assert_eq!(refresher.display().row(4), "Time:09:05:00");
    }

    #[test]
    fn next_day_resets_counter_before_check_in() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);
        send(&mut rx, b"Hello STM32,id:42,time:09:05,date:2024-01-02\n");
        send(&mut rx, b"Hello STM32,id:43,time:09:06,date:2024-01-02\n");
        assert_eq!(state.snapshot().count, 2);

        let tx = send(&mut rx, b"Hello STM32,id:42,time:09:05,date:2024-01-03\n");
        assert!(tx.contains("New day detected! Resetting count.\r\n"));
        assert_eq!(state.snapshot().count, 1);
    }

    #[test]
    fn overflow_drops_line_and_recovers() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);

        let mut noisy = vec![b'x'; LINE_CAPACITY + 40];
        noisy.extend_from_slice(b"Hello STM32,id:9\n");
        let tx = send(&mut rx, &noisy);
        assert_eq!(tx.matches("RX Buffer Overflow!").count(), 1);
        assert!(!tx.contains("CMD RX"));
        assert_eq!(state.snapshot().count, 0);

        let tx = send(&mut rx, b"Hello STM32,id:42,time:09:05,date:2024-01-02\r\n");
        assert!(tx.contains("OK: Door Open"));
        assert_eq!(state.snapshot().count, 1);
    }

    #[test]
    fn missing_id_updates_clock_only() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);

        let tx = send(&mut rx, b"Hello STM32,time:10:30,date:2024-05-06\n");
        assert!(tx.contains("'id:' tag not found."));
        assert!(tx.contains("No valid ID found. Check-in aborted."));
        assert!(!tx.contains("Door Open"));

        let snap = state.snapshot();
        assert_eq!(snap.count, 0);
        assert_eq!(snap.time.hours, 10);
        assert!(state.take_pending_check_in().is_none());
        assert!(state.take_refresh());
    }

    #[test]
    fn bad_fields_still_check_in() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);

        let tx = send(&mut rx, b"Hello STM32,id:5,time:25:00,date:1999-01-01\n");
        assert!(tx.contains("Invalid time value parsed."));
        assert!(tx.contains("Invalid date value parsed."));
        assert!(tx.contains("OK: Door Open"));
        assert_eq!(state.snapshot().count, 1);
        assert_eq!(state.snapshot().date, None);
    }

    #[test]
    fn stray_bytes_do_not_hide_the_command() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);

        let tx = send(&mut rx, b"\xFF\xFEHello STM32,id:42,time:09:05\n");
        assert!(tx.starts_with("CMD RX: ??Hello STM32,id:42"), "{}", tx);
        assert!(!tx.contains("Not 'Hello STM32'"));
        assert_eq!(state.snapshot().count, 1);

        let tx = send(&mut rx, b"noise \xC3\n");
        assert_eq!(tx, "Not 'Hello STM32' command.\r\n");
    }

    #[test]
    fn other_lines_are_reported() {
        let state = DeviceState::new();
        let mut rx = CommandReceiver::new(&state);
        let tx = send(&mut rx, b"PING\n");
        assert_eq!(tx, "Not 'Hello STM32' command.\r\n");
    }

    #[test]
    fn ticks_trigger_single_refresh() {
        let state = DeviceState::new();
        let mut refresher = DisplayRefresher::new(&state, GridDisplay::new(), RecordingDelay::default());
        refresher.start();
        assert!(!refresher.poll());

        state.tick();
        state.tick();
        state.tick();
        assert!(refresher.poll());
        assert_eq!(refresher.display().row(4), "Time:00:00:03");
        assert_eq!(refresher.display().row(3), "Date: --.-- --");
        assert!(!refresher.poll());
    }
}
