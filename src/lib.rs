// Core modules
pub mod common;
pub mod core;
pub mod camera;
pub mod service;
pub mod serial;
pub mod runtime;

// Re-export commonly used types
pub use common::{AttendanceError, Config, DevMode, Result};
pub use crate::core::{FaceBox, FaceDetector, OnnxFaceDetector, PresenceAction, PresenceDebouncer};
pub use camera::{Frame, StreamDemuxer};
pub use service::{AttendanceEvent, ConnectionState, UplinkChannel};
pub use serial::{DeviceAck, DownlinkRelay, RelayOutcome};
pub use runtime::{Event, Reactor};

pub mod config {
    pub use crate::common::config::*;
}
pub mod error {
    pub use crate::common::error::*;
}
pub mod paths {
    pub use crate::common::paths::*;
}
