//! Runs the door-controller firmware core against a PC serial port and draws
//! its panel in the terminal.

use attendance_device::{CommandReceiver, DeviceState, DisplayRefresher, TextDisplay};
use clap::Parser;
use crossterm::{cursor, style::Print, terminal};
use embedded_hal::delay::DelayNs;
use serialport::SerialPort;
use std::fmt;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

static STATE: DeviceState = DeviceState::new();

#[derive(Parser)]
#[command(name = "attendance-device-sim")]
#[command(about = "Door controller simulator on a serial port")]
struct Cli {
    /// Serial port the client's relay is wired to (e.g. one end of a socat pty pair)
    #[arg(short, long)]
    port: String,

    #[arg(short, long, default_value = "115200")]
    baud: u32,

    /// Enable debug logging
    #[arg(long)]
    dev: bool,
}

/// UART transmit side.
struct SerialTx(Box<dyn SerialPort>);

impl fmt::Write for SerialTx {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_all(s.as_bytes()).map_err(|_| fmt::Error)
    }
}

/// The 4x16 panel, drawn at the top-left of the terminal.
struct TerminalDisplay {
    out: io::Stdout,
}

impl TerminalDisplay {
    const ROWS: u16 = 4;
    const COLS: usize = 16;

    fn put(&mut self, row: u8, col: u8, text: &str) {
        let room = Self::COLS.saturating_sub(col.saturating_sub(1) as usize);
        let text: String = text.chars().take(room).collect();
        let _ = crossterm::execute!(
            self.out,
            cursor::MoveTo(col.saturating_sub(1) as u16 + 1, row.saturating_sub(1) as u16 + 1),
            Print(text)
        );
    }
}

impl TextDisplay for TerminalDisplay {
    fn clear(&mut self) {
        let _ = crossterm::execute!(self.out, terminal::Clear(terminal::ClearType::All), cursor::MoveTo(0, 0));
        let border = format!("+{}+", "-".repeat(Self::COLS));
        let _ = crossterm::execute!(self.out, Print(&border));
        for row in 1..=Self::ROWS {
            let _ = crossterm::execute!(
                self.out,
                cursor::MoveTo(0, row),
                Print("|"),
                cursor::MoveTo(Self::COLS as u16 + 1, row),
                Print("|")
            );
        }
        let _ = crossterm::execute!(self.out, cursor::MoveTo(0, Self::ROWS + 1), Print(&border));
    }

    fn show_str(&mut self, row: u8, col: u8, text: &str) {
        self.put(row, col, text);
    }

    fn show_num(&mut self, row: u8, col: u8, value: u32, digits: u8) {
        let digits = digits as usize;
        let text = format!("{:0width$}", value, width = digits);
        self.put(row, col, &text[text.len() - digits..]);
    }
}

struct SleepDelay;

impl DelayNs for SleepDelay {
    fn delay_ns(&mut self, ns: u32) {
        thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        thread::sleep(Duration::from_millis(ms as u64));
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they do not land on the panel
    let level = if cli.dev { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    let mut rx_port = serialport::new(&cli.port, cli.baud)
        .timeout(Duration::from_millis(50))
        .open()?;
    let mut tx = SerialTx(rx_port.try_clone()?);
    tracing::info!("Device simulator on {} @ {}", cli.port, cli.baud);

    thread::Builder::new()
        .name("uart-rx".into())
        .spawn(move || {
            let mut receiver = CommandReceiver::new(&STATE);
            receiver.announce(&mut tx);
            let mut buf = [0u8; 64];
            loop {
                match rx_port.read(&mut buf) {
                    Ok(n) => {
                        for &byte in &buf[..n] {
                            receiver.on_byte(byte, &mut tx);
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        tracing::error!("Serial read failed: {}", e);
                        return;
                    }
                }
            }
        })?;

    thread::Builder::new()
        .name("rtc-tick".into())
        .spawn(|| loop {
            thread::sleep(Duration::from_secs(1));
            STATE.tick();
        })?;

    let display = TerminalDisplay { out: io::stdout() };
    let mut refresher = DisplayRefresher::new(&STATE, display, SleepDelay);
    refresher.start();

    loop {
        if !refresher.poll() {
            thread::sleep(Duration::from_millis(10));
        }
    }
}
