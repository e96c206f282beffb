//! Tolerant extractor for host commands.
//!
//! A line is a command when it contains [`COMMAND_TAG`]. The `id:`, `time:`
//! and `date:` fields are then located independently, in any order, each
//! running up to the next `,` or the end of the line. A missing or malformed
//! field never prevents the others from being read.

use heapless::String;

use crate::clock::Date;

pub const COMMAND_TAG: &str = "Hello STM32";

/// Longest employee ID the terminal keeps.
pub const MAX_ID_LEN: usize = 19;

pub type EmployeeId = String<MAX_ID_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldError {
    /// The `tag:` marker is absent.
    TagMissing,
    /// Empty value, or longer than the field can hold.
    InvalidLength,
    /// The value does not have the expected shape.
    Format,
    /// Parsed, but outside the accepted range.
    OutOfRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub id: Result<EmployeeId, FieldError>,
    pub time: Result<(u8, u8), FieldError>,
    pub date: Result<Date, FieldError>,
}

impl Command {
    pub fn employee_id(&self) -> Option<&str> {
        self.id.as_ref().ok().map(|id| id.as_str())
    }
}

/// Returns `None` when the line is not a command at all.
pub fn parse_command(line: &str) -> Option<Command> {
    if !line.contains(COMMAND_TAG) {
        return None;
    }

    Some(Command {
        id: field(line, "id:").and_then(parse_id),
        time: field(line, "time:").and_then(parse_time),
        date: field(line, "date:").and_then(parse_date),
    })
}

fn field<'a>(line: &'a str, tag: &str) -> Result<&'a str, FieldError> {
    let start = line.find(tag).ok_or(FieldError::TagMissing)? + tag.len();
    let rest = &line[start..];
    let end = rest.find([',', '\r', '\n']).unwrap_or(rest.len());
    Ok(&rest[..end])
}

fn parse_id(raw: &str) -> Result<EmployeeId, FieldError> {
    if raw.is_empty() || raw.len() > MAX_ID_LEN {
        return Err(FieldError::InvalidLength);
    }
    let mut id = EmployeeId::new();
    id.push_str(raw).map_err(|_| FieldError::InvalidLength)?;
    Ok(id)
}

fn parse_time(raw: &str) -> Result<(u8, u8), FieldError> {
    let [h, m] = scan_fields::<2>(raw, ':').ok_or(FieldError::Format)?;
    if !(0..=23).contains(&h) || !(0..=59).contains(&m) {
        return Err(FieldError::OutOfRange);
    }
    Ok((h as u8, m as u8))
}

fn parse_date(raw: &str) -> Result<Date, FieldError> {
    let [year, month, day] = scan_fields::<3>(raw, '-').ok_or(FieldError::Format)?;
    if year <= 2000 || year > u16::MAX as i32 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return Err(FieldError::OutOfRange);
    }
    Ok(Date {
        year: year as u16,
        month: month as u8,
        day: day as u8,
    })
}

/// `N` integers separated by `sep`. Leading whitespace before each number is
/// skipped and anything after the last number is ignored.
fn scan_fields<const N: usize>(raw: &str, sep: char) -> Option<[i32; N]> {
    let mut out = [0i32; N];
    let mut parts = raw.splitn(N, sep);
    for (i, slot) in out.iter_mut().enumerate() {
        let (value, rest) = leading_int(parts.next()?)?;
        if i + 1 < N && !rest.is_empty() {
            return None;
        }
        *slot = value;
    }
    Some(out)
}

fn leading_int(s: &str) -> Option<(i32, &str)> {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let (negative, mut i) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };
    let digits_start = i;
    let mut value = 0i32;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        value = value.checked_mul(10)?.checked_add((bytes[i] - b'0') as i32)?;
        i += 1;
    }
    if i == digits_start {
        return None;
    }
    Some((if negative { -value } else { value }, &s[i..]))
}
