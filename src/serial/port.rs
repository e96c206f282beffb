use std::io::{self, Read};
use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serialport::{SerialPort, SerialPortInfo};

use crate::common::config::SerialConfig;
use crate::error::Result;
use crate::runtime::events::Event;

const MAX_LINE: usize = 4096;

pub fn open_port(config: &SerialConfig) -> Result<Box<dyn SerialPort>> {
    let port = serialport::new(&config.port, config.baud_rate)
        .timeout(Duration::from_millis(config.write_timeout_ms))
        .open()?;
    tracing::info!("Opened serial port {} @ {}", config.port, config.baud_rate);
    Ok(port)
}

pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    Ok(serialport::available_ports()?)
}

/// Cuts a byte stream into text lines. `\r` is dropped; a line longer than
/// the limit is flushed as-is.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buf: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            match b {
                b'\r' => {}
                b'\n' => lines.push(self.take()),
                _ => {
                    self.buf.push(b);
                    if self.buf.len() >= MAX_LINE {
                        lines.push(self.take());
                    }
                }
            }
        }
        lines.retain(|l| !l.is_empty());
        lines
    }

    fn take(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}

/// Forwards every line the device prints. The port's read timeout only paces
/// the loop.
pub fn spawn_line_reader(
    mut port: Box<dyn SerialPort>,
    events: SyncSender<Event>,
) -> Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("serial-reader".into())
        .spawn(move || {
            let mut splitter = LineSplitter::new();
            let mut buf = [0u8; 256];
            loop {
                match port.read(&mut buf) {
                    Ok(0) => continue,
                    Ok(n) => {
                        for line in splitter.push(&buf[..n]) {
                            if events.send(Event::SerialLineReceived(line)).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut
                        || e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        tracing::warn!("Serial read stopped: {}", e);
                        return;
                    }
                }
            }
        })?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_crlf_lines_across_reads() {
        let mut splitter = LineSplitter::new();
        assert!(splitter.push(b"CMD RX: Hello").is_empty());
        let lines = splitter.push(b" STM32\r\nOK: Door Open\r\n\r\nTime");
        assert_eq!(lines, vec!["CMD RX: Hello STM32", "OK: Door Open"]);
        assert_eq!(splitter.push(b" Sync: 09:05\n"), vec!["Time Sync: 09:05"]);
    }

    #[test]
    fn long_lines_are_flushed() {
        let mut splitter = LineSplitter::new();
        let lines = splitter.push(&vec![b'a'; MAX_LINE + 10]);
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].len(), MAX_LINE);
    }
}
