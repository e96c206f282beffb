use std::io::{self, Write};
use std::time::{Duration, Instant};

use attendance_device::command::MAX_ID_LEN;
use attendance_device::COMMAND_TAG;
use chrono::NaiveDateTime;

use crate::error::{AttendanceError, Result};
use crate::service::protocol::AttendanceEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Event was not for a known employee; nothing was written.
    Skipped,
    Sent { command: String },
}

/// `Hello STM32,id:<id>,time:HH:MM,date:YYYY-MM-DD\n`, stamped with the
/// local clock rather than the backend's time.
pub fn build_command(employee_id: &str, now: NaiveDateTime) -> String {
    format!(
        "{},id:{},time:{},date:{}\n",
        COMMAND_TAG,
        employee_id.trim(),
        now.format("%H:%M"),
        now.format("%Y-%m-%d")
    )
}

/// IDs the device can store as one field: non-empty, at most
/// [`MAX_ID_LEN`] bytes, and free of the command separators.
pub fn is_relayable_id(employee_id: &str) -> bool {
    let id = employee_id.trim();
    !id.is_empty() && id.len() <= MAX_ID_LEN && !id.contains([',', '\r', '\n'])
}

pub fn should_relay(event: &AttendanceEvent) -> bool {
    event.is_actionable() && is_relayable_id(&event.employee_id)
}

/// Forwards recognised check-ins to the door controller. Serial ports are
/// opened with `write_timeout`; a write or drain that still runs past it is
/// reported as [`AttendanceError::DeviceWriteTimeout`].
pub struct DownlinkRelay<W: Write> {
    port: W,
    write_timeout: Duration,
}

impl<W: Write> DownlinkRelay<W> {
    pub fn new(port: W, write_timeout: Duration) -> Self {
        Self { port, write_timeout }
    }

    pub fn relay(&mut self, event: &AttendanceEvent) -> Result<RelayOutcome> {
        self.relay_at(event, chrono::Local::now().naive_local())
    }

    pub fn relay_at(&mut self, event: &AttendanceEvent, now: NaiveDateTime) -> Result<RelayOutcome> {
        if event.is_actionable() && !is_relayable_id(&event.employee_id) {
            tracing::warn!("Not relaying malformed employee ID {:?}", event.employee_id);
            return Ok(RelayOutcome::Skipped);
        }
        if !should_relay(event) {
            tracing::debug!("Not relaying event for {:?} ({:?})", event.employee_id, event.name);
            return Ok(RelayOutcome::Skipped);
        }

        let command = build_command(&event.employee_id, now);
        let started = Instant::now();
        self.port
            .write_all(command.as_bytes())
            .and_then(|_| self.port.flush())
            .map_err(|e| self.write_error(e))?;

        let elapsed = started.elapsed();
        if elapsed > self.write_timeout {
            tracing::warn!("Serial write took {:?} (limit {:?})", elapsed, self.write_timeout);
            return Err(AttendanceError::DeviceWriteTimeout(self.write_timeout));
        }

        tracing::info!("Relayed check-in for {} to device", event.employee_id);
        Ok(RelayOutcome::Sent { command })
    }

    pub fn get_ref(&self) -> &W {
        &self.port
    }

    fn write_error(&self, e: io::Error) -> AttendanceError {
        match e.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => {
                AttendanceError::DeviceWriteTimeout(self.write_timeout)
            }
            _ => AttendanceError::Io(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .and_then(|d| d.and_hms_opt(h, m, 30))
            .unwrap()
    }

    fn event(id: &str, name: &str) -> AttendanceEvent {
        AttendanceEvent {
            employee_id: id.into(),
            name: name.into(),
            department: "Ops".into(),
            time: "2023-12-31 23:59:59".into(),
        }
    }

    struct StalledPort;

    impl Write for StalledPort {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::TimedOut, "stalled"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct SlowPort(Duration);

    impl Write for SlowPort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            std::thread::sleep(self.0);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn command_uses_local_clock() {
        assert_eq!(
            build_command("42", at(9, 5)),
            "Hello STM32,id:42,time:09:05,date:2024-01-02\n"
        );
    }

    #[test]
    fn relays_known_employee() {
        let mut relay = DownlinkRelay::new(Vec::new(), Duration::from_millis(1000));
        let outcome = relay.relay_at(&event("42", "Ada"), at(9, 5)).unwrap();
        assert_eq!(
            outcome,
            RelayOutcome::Sent { command: "Hello STM32,id:42,time:09:05,date:2024-01-02\n".into() }
        );
        assert_eq!(relay.get_ref().as_slice(), b"Hello STM32,id:42,time:09:05,date:2024-01-02\n");
    }

    #[test]
    fn unknown_events_never_reach_the_port() {
        let mut relay = DownlinkRelay::new(Vec::new(), Duration::from_millis(1000));
        for e in [event("", "Ada"), event("42", "unknown-user"), event("42", "")] {
            assert_eq!(relay.relay_at(&e, at(9, 5)).unwrap(), RelayOutcome::Skipped);
        }
        assert!(relay.get_ref().is_empty());
    }

    #[test]
    fn ids_that_break_the_command_are_skipped() {
        let mut relay = DownlinkRelay::new(Vec::new(), Duration::from_millis(1000));
        for id in ["4,2\nHello STM32,id:99", "4\r2", "12345678901234567890"] {
            let e = event(id, "Ada");
            assert!(e.is_actionable());
            assert_eq!(relay.relay_at(&e, at(9, 5)).unwrap(), RelayOutcome::Skipped);
        }
        assert!(relay.get_ref().is_empty());

        assert!(is_relayable_id("1234567890123456789"));
    }

    #[test]
    fn slow_write_reports_timeout() {
        let mut relay = DownlinkRelay::new(SlowPort(Duration::from_millis(60)), Duration::from_millis(20));
        let err = relay.relay_at(&event("42", "Ada"), at(9, 5)).unwrap_err();
        assert!(matches!(err, AttendanceError::DeviceWriteTimeout(d) if d == Duration::from_millis(20)));
    }

    #[test]
    fn stalled_write_reports_timeout() {
        let mut relay = DownlinkRelay::new(StalledPort, Duration::from_millis(1000));
        let err = relay.relay_at(&event("42", "Ada"), at(9, 5)).unwrap_err();
        assert!(matches!(err, AttendanceError::DeviceWriteTimeout(d) if d == Duration::from_millis(1000)));
    }
}
