//! SSD1306 OLED rendering of the status board.
//!
//! The control plane writes rows into [`BOARD`]; `display_task` redraws
//! the panel when something changed.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Ticker};
use embedded_graphics::mono_font::ascii::FONT_5X8;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::{Baseline, Text};
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

use super::{Row, StatusBoard, VISIBLE_ROWS};
use crate::config::DISPLAY_REFRESH_MS;
use crate::error::Error;

/// Pixel height of one board row (64 px / 8 rows).
const ROW_HEIGHT: i32 = 8;

/// Rows as last written by the control plane.
pub static BOARD: Mutex<CriticalSectionRawMutex, RefCell<StatusBoard>> =
    Mutex::new(RefCell::new(StatusBoard::new()));

pub fn set_row(row: Row, text: &str) {
    BOARD.lock(|b| b.borrow_mut().set(row, text));
}

pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// Initialise the SSD1306 and clear the screen.
pub fn init<I2C>(i2c: I2C) -> Result<Display<I2C>, Error>
where
    I2C: embedded_hal::i2c::I2c,
{
    let interface = I2CDisplayInterface::new(i2c);
    let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
        .into_buffered_graphics_mode();
    display.init().map_err(|_| Error::Display)?;
    display.clear_buffer();
    display.flush().map_err(|_| Error::Display)?;
    Ok(display)
}

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_5X8)
        .text_color(BinaryColor::On)
        .build()
}

/// Draw the non-empty rows of `board`, top to bottom.
pub fn draw<I2C>(display: &mut Display<I2C>, board: &StatusBoard) -> Result<(), Error>
where
    I2C: embedded_hal::i2c::I2c,
{
    display.clear_buffer();
    let style = text_style();
    for (i, text) in board.visible().take(VISIBLE_ROWS).enumerate() {
        let origin = Point::new(0, i as i32 * ROW_HEIGHT);
        let _ = Text::with_baseline(text, origin, style, Baseline::Top).draw(display);
    }
    display.flush().map_err(|_| Error::Display)
}

pub async fn display_task<I2C>(mut display: Display<I2C>) -> !
where
    I2C: embedded_hal::i2c::I2c,
{
    let mut ticker = Ticker::every(Duration::from_millis(DISPLAY_REFRESH_MS));
    loop {
        ticker.next().await;
        let snapshot = BOARD.lock(|b| {
            let mut board = b.borrow_mut();
            board.take_dirty().then(|| board.clone())
        });
        if let Some(board) = snapshot {
            if let Err(e) = draw(&mut display, &board) {
                warn!("display: redraw failed ({})", e);
            }
        }
    }
}
