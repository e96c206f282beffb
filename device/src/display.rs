//! Panel layouts. Rows and columns are 1-based, as on the 4x16 OLED.

use crate::state::Snapshot;

/// Character panel addressed by row and column.
pub trait TextDisplay {
    fn clear(&mut self);
    fn show_str(&mut self, row: u8, col: u8, text: &str);
    /// Zero-padded to `digits` characters; higher digits are cut off.
    fn show_num(&mut self, row: u8, col: u8, value: u32, digits: u8);
}

pub const TITLE: &str = "Attendance Sys";
pub const DATE_PLACEHOLDER: &str = "Date: --.-- --";
pub const TIME_PLACEHOLDER: &str = "Time: --:--:--";

/// Columns of the ID shown on the check-in banner.
pub const BANNER_ID_WIDTH: usize = 10;

pub fn draw_idle_layout<D: TextDisplay>(display: &mut D) {
    display.clear();
    display.show_str(1, 1, TITLE);
    display.show_str(2, 1, "Count: ---");
    display.show_str(3, 1, DATE_PLACEHOLDER);
    display.show_str(4, 1, TIME_PLACEHOLDER);
}

/// Counter, then date, then time.
pub fn draw_status<D: TextDisplay>(display: &mut D, snapshot: &Snapshot) {
    display.show_str(2, 1, "Count:");
    display.show_num(2, 7, snapshot.count as u32, 3);
    display.show_str(2, 10, "      ");

    match snapshot.date {
        Some(date) => {
            display.show_str(3, 1, "Date:");
            display.show_num(3, 6, date.month as u32, 2);
            display.show_str(3, 8, "-");
            display.show_num(3, 9, date.day as u32, 2);
            display.show_str(3, 11, " ");
            display.show_num(3, 12, (date.year % 100) as u32, 2);
            display.show_str(3, 14, "  ");
        }
        None => display.show_str(3, 1, DATE_PLACEHOLDER),
    }

    display.show_str(4, 1, "Time:");
    display.show_num(4, 6, snapshot.time.hours as u32, 2);
    display.show_str(4, 8, ":");
    display.show_num(4, 9, snapshot.time.minutes as u32, 2);
    display.show_str(4, 11, ":");
    display.show_num(4, 12, snapshot.time.seconds as u32, 2);
    display.show_str(4, 14, "  ");
}

pub fn draw_check_in<D: TextDisplay>(display: &mut D, employee_id: &str) {
    display.clear();
    display.show_str(1, 1, "ID:");
    let end = employee_id
        .char_indices()
        .nth(BANNER_ID_WIDTH)
        .map(|(i, _)| i)
        .unwrap_or(employee_id.len());
    display.show_str(1, 4, &employee_id[..end]);
    display.show_str(2, 1, "Check-in OK!");
}

#[cfg(test)]
pub(crate) mod testing {
    use super::TextDisplay;

    pub const ROWS: usize = 4;
    pub const COLS: usize = 16;

    /// In-memory 4x16 panel.
    pub struct GridDisplay {
        pub cells: [[u8; COLS]; ROWS],
        pub clears: usize,
    }

    impl GridDisplay {
        pub fn new() -> Self {
            Self {
                cells: [[b' '; COLS]; ROWS],
                clears: 0,
            }
        }

        pub fn row(&self, row: usize) -> String {
            String::from_utf8_lossy(&self.cells[row - 1]).trim_end().to_string()
        }

        fn put(&mut self, row: u8, col: u8, bytes: &[u8]) {
            let r = row as usize - 1;
            for (i, b) in bytes.iter().enumerate() {
                let c = col as usize - 1 + i;
                if c < COLS {
                    self.cells[r][c] = *b;
                }
            }
        }
    }

    impl TextDisplay for GridDisplay {
        fn clear(&mut self) {
            self.cells = [[b' '; COLS]; ROWS];
            self.clears += 1;
        }

        fn show_str(&mut self, row: u8, col: u8, text: &str) {
            self.put(row, col, text.as_bytes());
        }

        fn show_num(&mut self, row: u8, col: u8, value: u32, digits: u8) {
            let text = format!("{:0width$}", value, width = digits as usize);
            let text = &text[text.len() - digits as usize..];
            self.put(row, col, text.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::GridDisplay;
    use super::*;
    use crate::clock::{Date, TimeOfDay};

    #[test]
    fn status_rows_render_synced_date() {
        let mut display = GridDisplay::new();
        draw_idle_layout(&mut display);
        draw_status(
            &mut display,
            &Snapshot {
                time: TimeOfDay { hours: 9, minutes: 5, seconds: 7 },
                date: Some(Date { year: 2024, month: 1, day: 2 }),
                count: 12,
            },
        );
        assert_eq!(display.row(1), TITLE);
        assert_eq!(display.row(2), "Count:012");
        assert_eq!(display.row(3), "Date:01-02 24");
        assert_eq!(display.row(4), "Time:09:05:07");
    }

    #[test]
    fn unsynced_date_shows_placeholder() {
        let mut display = GridDisplay::new();
        draw_status(
            &mut display,
            &Snapshot {
                time: TimeOfDay::midnight(),
                date: None,
                count: 0,
            },
        );
        assert_eq!(display.row(3), DATE_PLACEHOLDER);
    }

    #[test]
    fn banner_truncates_long_ids() {
        let mut display = GridDisplay::new();
        draw_check_in(&mut display, "ABCDEFGHIJKLMN");
        assert_eq!(display.row(1), "ID:ABCDEFGHIJ");
        assert_eq!(display.row(2), "Check-in OK!");
    }
}
