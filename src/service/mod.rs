pub mod client;
pub mod protocol;

pub use client::{ConnectionState, UplinkChannel};
pub use protocol::{encode_image_frame, AttendanceEvent, DisplayRecord, ReplyDecoder};
