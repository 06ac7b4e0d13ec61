//! SSD1306 128x64 status display.
//!
//! Rendering is cosmetic: every draw or flush error is logged and
//! swallowed so a flaky display can never take down the report loop.

use core::fmt::Write as _;

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use embedded_hal::i2c::I2c;
use log::warn;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::{I2CDisplayInterface, Ssd1306};

use aer_core::measurement::{ParticleSample, PresentationSink};

type Display<I> =
    Ssd1306<I2CInterface<I>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct Oled<I: I2c> {
    display: Display<I>,
    /// Cleared if init failed; draws become no-ops on a dead panel.
    alive: bool,
}

impl<I: I2c> Oled<I> {
    /// Bring up the panel. A missing display is not fatal: the node keeps
    /// reporting, it just shows nothing.
    pub fn new(i2c: I) -> Self {
        let interface = I2CDisplayInterface::new(i2c);
        let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        let alive = display.init().is_ok();
        if !alive {
            warn!("display init failed, rendering disabled");
        }
        Self { display, alive }
    }

    fn draw_lines(&mut self, lines: &[&str]) {
        if !self.alive {
            return;
        }
        self.display.clear_buffer();
        let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);
        for (i, line) in lines.iter().enumerate() {
            let y = 12 + 12 * i as i32;
            if Text::new(line, Point::new(0, y), style)
                .draw(&mut self.display)
                .is_err()
            {
                warn!("display draw failed");
                return;
            }
        }
        if self.display.flush().is_err() {
            warn!("display flush failed");
        }
    }
}

impl<I: I2c> PresentationSink for Oled<I> {
    fn render(&mut self, sample: &ParticleSample) {
        let mut l1: heapless::String<24> = heapless::String::new();
        let mut l2: heapless::String<24> = heapless::String::new();
        let mut l3: heapless::String<24> = heapless::String::new();
        let _ = write!(l1, "PM1.0: {:>4} ug/m3", sample.pm10_standard);
        let _ = write!(l2, "PM2.5: {:>4} ug/m3", sample.pm25_standard);
        let _ = write!(l3, "PM10 : {:>4} ug/m3", sample.pm100_standard);
        self.draw_lines(&["Air Quality", &l1, &l2, &l3]);
    }

    fn render_status(&mut self, status: &str) {
        self.draw_lines(&["Air Quality", status]);
    }
}
