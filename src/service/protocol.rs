use serde_json::Value;
use std::io::Write;

use crate::error::{AttendanceError, Result};

// Uplink framing: big-endian u64 byte count, then the JPEG bytes
pub const LENGTH_PREFIX_LEN: usize = 8;

// Display-only fallbacks for empty reply fields
pub const UNKNOWN_USER: &str = "unknown-user";
pub const UNKNOWN_DEPARTMENT: &str = "unknown-department";

/// Name the backend reports when the face matched nobody.
pub const BACKEND_UNKNOWN_NAME: &str = "未知用户";

// Replies that never end are dropped past this size
pub const MAX_REPLY_BUFFER: usize = 64 * 1024;

pub fn encode_image_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(LENGTH_PREFIX_LEN + payload.len());
    framed.extend_from_slice(&(payload.len() as u64).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

pub fn write_image_frame<W: Write>(writer: &mut W, payload: &[u8]) -> Result<()> {
    writer.write_all(&(payload.len() as u64).to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Backend verdict for one uploaded face, exactly as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub time: String,
}

/// What the operator sees for an event; empty fields are filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayRecord {
    pub employee_id: String,
    pub name: String,
    pub department: String,
    pub time: String,
}

impl AttendanceEvent {
    /// Missing or non-string fields read as empty.
    pub fn from_value(value: &Value) -> Result<Self> {
        let obj = value.as_object().ok_or_else(|| {
            AttendanceError::ProtocolParse(format!("expected a JSON object, got {}", value))
        })?;
        let field = |key: &str| {
            obj.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            employee_id: field("employeeID"),
            name: field("name"),
            department: field("department"),
            time: field("time"),
        })
    }

    /// Events for unrecognised faces are shown but never forwarded.
    pub fn is_actionable(&self) -> bool {
        let name = self.name.trim();
        !self.employee_id.trim().is_empty()
            && !name.is_empty()
            && name != UNKNOWN_USER
            && name != BACKEND_UNKNOWN_NAME
            && !name.eq_ignore_ascii_case("unknown")
    }

    pub fn display(&self) -> DisplayRecord {
        let or = |value: &str, fallback: &str| {
            if value.is_empty() { fallback.to_string() } else { value.to_string() }
        };
        let time = if self.time.is_empty() {
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
        } else {
            self.time.clone()
        };

        DisplayRecord {
            employee_id: self.employee_id.clone(),
            name: or(&self.name, UNKNOWN_USER),
            department: or(&self.department, UNKNOWN_DEPARTMENT),
            time,
        }
    }
}

/// Reassembles JSON replies from a TCP byte stream. A reply may arrive split
/// across reads, or several may arrive in one read.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    buffer: Vec<u8>,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, data: &[u8]) -> Vec<Result<AttendanceEvent>> {
        self.buffer.extend_from_slice(data);

        let mut decoded = Vec::new();
        let consumed = {
            let mut stream = serde_json::Deserializer::from_slice(&self.buffer).into_iter::<Value>();
            let mut consumed = 0;
            loop {
                match stream.next() {
                    Some(Ok(value)) => {
                        consumed = stream.byte_offset();
                        decoded.push(AttendanceEvent::from_value(&value));
                    }
                    // Incomplete reply; wait for more bytes
                    Some(Err(e)) if e.is_eof() => break,
                    Some(Err(e)) => {
                        decoded.push(Err(AttendanceError::ProtocolParse(e.to_string())));
                        consumed = self.buffer.len();
                        break;
                    }
                    None => {
                        consumed = stream.byte_offset();
                        break;
                    }
                }
            }
            consumed
        };
        self.buffer.drain(..consumed);

        if self.buffer.len() > MAX_REPLY_BUFFER {
            decoded.push(Err(AttendanceError::ProtocolParse(format!(
                "reply exceeded {} bytes without completing", MAX_REPLY_BUFFER
            ))));
            self.buffer.clear();
        }

        decoded
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }
}
