//! User interface - status board, gesture input and the OLED/button glue.
//!
//! The control plane never draws. It updates rows of a [`StatusBoard`]
//! through `Action::Render`; the display task redraws the board
//! periodically on the SSD1306.
//!
//! ## Components
//!
//! - **Board**: fixed rows of short text, one per [`Row`]
//! - **Gesture**: ordered two-button press/release detector
//! - **Display**: SSD1306 128×64 OLED via I²C (embedded only)
//! - **Buttons**: 2 tactile switches with debouncing (embedded only)

pub mod gesture;

#[cfg(feature = "embedded")]
pub mod buttons;
#[cfg(feature = "embedded")]
pub mod display;

use core::fmt::Write;

use heapless::String;

/// Characters per display row (128 px / 5 px font, rounded down).
pub const LINE_LEN: usize = 24;

/// One row of text.
pub type Line = String<LINE_LEN>;

/// Text rows that fit on the panel (64 px / 8 px font).
pub const VISIBLE_ROWS: usize = 8;

/// Rows of the status board, top to bottom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Row {
    Name,
    Status,
    Passkey,
    Prompt,
    Temperature,
    FlexAngle,
    TiltCount,
    /// Peer role only.
    Posture,
    /// Sensor role only.
    Button,
}

impl Row {
    pub const COUNT: usize = 9;

    pub const ALL: [Row; Self::COUNT] = [
        Row::Name,
        Row::Status,
        Row::Passkey,
        Row::Prompt,
        Row::Temperature,
        Row::FlexAngle,
        Row::TiltCount,
        Row::Posture,
        Row::Button,
    ];
}

/// Build a line from `text`, truncating to [`LINE_LEN`].
pub fn line(text: &str) -> Line {
    let mut out = Line::new();
    for c in text.chars() {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}

/// Build a line with `format_args!`, truncating on overflow.
pub fn line_fmt(args: core::fmt::Arguments<'_>) -> Line {
    let mut out = Line::new();
    let _ = out.write_fmt(args);
    out
}

/// Text model of the display.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    rows: [Line; Row::COUNT],
    dirty: bool,
}

impl StatusBoard {
    pub const fn new() -> Self {
        const EMPTY: Line = Line::new();
        Self {
            rows: [EMPTY; Row::COUNT],
            dirty: false,
        }
    }

    pub fn set(&mut self, row: Row, text: &str) {
        let slot = &mut self.rows[row as usize];
        if slot.as_str() != text {
            *slot = line(text);
            self.dirty = true;
        }
    }

    pub fn row(&self, row: Row) -> &str {
        self.rows[row as usize].as_str()
    }

    /// Non-empty rows, top to bottom. Each role fills at most
    /// [`VISIBLE_ROWS`] of them.
    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.rows
            .iter()
            .map(|r| r.as_str())
            .filter(|r| !r.is_empty())
    }

    pub fn clear(&mut self) {
        for slot in self.rows.iter_mut() {
            slot.clear();
        }
        self.dirty = true;
    }

    /// Whether anything changed since the last call.
    pub fn take_dirty(&mut self) -> bool {
        core::mem::replace(&mut self.dirty, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_truncates_to_width() {
        let long = "Posture node status line that is far too long";
        assert_eq!(line(long).len(), LINE_LEN);
    }

    #[test]
    fn line_fmt_formats_passkey_with_leading_zeros() {
        assert_eq!(line_fmt(format_args!("Passkey {:06}", 42)).as_str(), "Passkey 000042");
    }

    #[test]
    fn board_tracks_changes() {
        let mut board = StatusBoard::default();
        board.set(Row::Status, "Advertising");
        assert!(board.take_dirty());
        assert!(!board.take_dirty());

        board.set(Row::Status, "Advertising");
        assert!(!board.take_dirty());

        assert_eq!(board.row(Row::Status), "Advertising");
        assert_eq!(board.row(Row::Posture), "");
    }

    #[test]
    fn visible_rows_skip_empty_ones_in_order() {
        let mut board = StatusBoard::new();
        board.set(Row::Name, "PostureNode sensor");
        board.set(Row::Temperature, "Temp: 21.0C");
        board.set(Row::Button, "Button Pressed");
        let shown: heapless::Vec<&str, { Row::COUNT }> = board.visible().collect();
        assert_eq!(
            shown.as_slice(),
            &["PostureNode sensor", "Temp: 21.0C", "Button Pressed"]
        );
    }
}
