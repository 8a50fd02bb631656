use std::{io::Write, thread, time::Duration};

use chrono::{NaiveTime, Timelike};

use crate::error::Result;

/// the four digit clock face with a dot after every digit
pub trait Display: Send {
    fn show_time(&mut self, time: NaiveTime);
    /// turns the dot after digit `index` (0..4) on or off
    fn set_indicator(&mut self, index: usize, on: bool);
    /// 0 is darkest, 15 brightest
    fn set_brightness(&mut self, level: u8);
    fn clear(&mut self);
    /// pushes the buffered state to the device
    fn write(&mut self) -> Result<()>;

    fn startup_animation(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown_animation(&mut self) -> Result<()> {
        Ok(())
    }

    fn error_animation(&mut self) -> Result<()> {
        Ok(())
    }
}

const FRAME: Duration = Duration::from_millis(120);

/// draws the clock face on a single terminal line
#[derive(Debug)]
pub struct ConsoleDisplay<W> {
    out: W,
    digits: [char; 4],
    dots: [bool; 4],
    brightness: u8,
}

impl<W: Write + Send> ConsoleDisplay<W> {
    pub const fn new(out: W) -> Self {
        Self {
            out,
            digits: [' '; 4],
            dots: [false; 4],
            brightness: 15,
        }
    }

    /// the line `write` would print, without the carriage return
    #[must_use]
    pub fn render(&self) -> String {
        let face: String = self
            .digits
            .iter()
            .zip(self.dots)
            .flat_map(|(digit, dot)| [*digit, if dot { '.' } else { ' ' }])
            .collect();
        format!("{face}[{:>2}]", self.brightness)
    }

    fn animate(&mut self, frames: &[[char; 4]]) -> Result<()> {
        for frame in frames {
            self.clear();
            self.digits = *frame;
            self.write()?;
            thread::sleep(FRAME);
        }
        self.clear();
        self.write()
    }
}

impl<W: Write + Send> Display for ConsoleDisplay<W> {
    fn show_time(&mut self, time: NaiveTime) {
        let text = format!("{:02}{:02}", time.hour(), time.minute());
        for (slot, digit) in self.digits.iter_mut().zip(text.chars()) {
            *slot = digit;
        }
    }

    fn set_indicator(&mut self, index: usize, on: bool) {
        if let Some(dot) = self.dots.get_mut(index) {
            *dot = on;
        }
    }

    fn set_brightness(&mut self, level: u8) {
        self.brightness = level.min(15);
    }

    fn clear(&mut self) {
        self.digits = [' '; 4];
        self.dots = [false; 4];
    }

    fn write(&mut self) -> Result<()> {
        let line = self.render();
        write!(self.out, "\r{line}")?;
        self.out.flush()?;
        Ok(())
    }

    fn startup_animation(&mut self) -> Result<()> {
        self.animate(&[
            ['*', ' ', ' ', ' '],
            ['*', '*', ' ', ' '],
            ['*', '*', '*', ' '],
            ['*', '*', '*', '*'],
            [' ', '*', '*', '*'],
            [' ', ' ', '*', '*'],
            [' ', ' ', ' ', '*'],
        ])
    }

    fn shutdown_animation(&mut self) -> Result<()> {
        let on = ['8'; 4];
        let off = [' '; 4];
        self.animate(&[on, off, on, off, on, off])
    }

    fn error_animation(&mut self) -> Result<()> {
        self.animate(&[
            ['-', ' ', ' ', ' '],
            [' ', '-', ' ', ' '],
            [' ', ' ', '-', ' '],
            [' ', ' ', ' ', '-'],
            [' ', ' ', '-', ' '],
            [' ', '-', ' ', ' '],
            ['-', ' ', ' ', ' '],
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_time_dots_and_brightness() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.show_time(NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        display.set_indicator(1, true);
        display.set_indicator(3, true);
        display.set_indicator(9, true);
        display.set_brightness(4);
        assert_eq!(display.render(), "0 7.0 5.[ 4]");

        display.write().unwrap();
        assert_eq!(String::from_utf8(display.out.clone()).unwrap(), "\r0 7.0 5.[ 4]");
    }

    #[test]
    fn clear_blanks_the_face() {
        let mut display = ConsoleDisplay::new(Vec::new());
        display.show_time(NaiveTime::from_hms_opt(23, 59, 0).unwrap());
        display.set_indicator(0, true);
        display.clear();
        assert_eq!(display.render(), "        [15]");
    }
}
