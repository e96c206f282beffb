//! Check-in terminal firmware core.
//!
//! The terminal receives `Hello STM32,id:<id>,time:<HH:MM>,date:<YYYY-MM-DD>`
//! lines over a UART, keeps a wall clock advanced by a 1 Hz tick, counts the
//! day's check-ins and renders everything on a 4-row text panel.
//!
//! Three execution contexts share [`DeviceState`]:
//! - the UART receive interrupt drives a [`CommandReceiver`],
//! - the timer interrupt calls [`DeviceState::tick`],
//! - the main loop polls a [`DisplayRefresher`].
//!
//! Hardware is reached through [`TextDisplay`], `core::fmt::Write` (UART
//! transmit) and `embedded_hal::delay::DelayNs`.
#![cfg_attr(not(test), no_std)]

pub mod clock;
pub mod command;
pub mod controller;
pub mod display;
pub mod line;
pub mod state;

pub use clock::{ClockState, Date, TimeOfDay};
pub use command::{parse_command, Command, EmployeeId, FieldError, COMMAND_TAG};
pub use controller::{CommandReceiver, DisplayRefresher, CHECK_IN_DWELL_MS, LINE_CAPACITY};
pub use display::TextDisplay;
pub use line::{LineAssembler, LineEvent};
pub use state::{Applied, DateSync, DeviceState, Snapshot};
