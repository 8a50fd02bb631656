//! ambient light from a photocell and capacitor on one gpio: discharge the
//! capacitor, switch to input and count how long it takes to charge back up

use std::{thread, time::Duration};

use crate::{
    error::Result,
    gpio::{Direction, SysfsPin},
};

/// charge count at or above which the room counts as dark
pub const UPPER_LIMIT: u32 = 400;
const LOWER_LIMIT: u32 = 1;
/// display brightness steps above zero
pub const MAX_LEVEL: u8 = 15;

const DISCHARGE_TIME: Duration = Duration::from_millis(100);

pub trait LightSensor: Send {
    /// raw charge time, small when bright
    fn charge_count(&mut self) -> Result<u32>;
}

#[derive(Debug)]
pub struct ChargeTimeSensor {
    pin: SysfsPin,
}

impl ChargeTimeSensor {
    #[must_use]
    pub const fn new(pin: SysfsPin) -> Self {
        Self { pin }
    }
}

impl LightSensor for ChargeTimeSensor {
    fn charge_count(&mut self) -> Result<u32> {
        self.pin.set_direction(Direction::Out)?;
        self.pin.write(false)?;
        thread::sleep(DISCHARGE_TIME);
        self.pin.set_direction(Direction::In)?;
        let mut count = 0;
        // past the upper limit every reading maps to the same level
        while !self.pin.read()? && count < UPPER_LIMIT * 2 {
            count += 1;
        }
        Ok(count)
    }
}

/// maps a charge count onto the display brightness scale 0..=15
#[must_use]
pub fn level_from_charge(count: u32) -> u8 {
    let brightness = UPPER_LIMIT
        .saturating_sub(count)
        .clamp(LOWER_LIMIT, UPPER_LIMIT);
    let level = brightness / (UPPER_LIMIT / u32::from(MAX_LEVEL));
    u8::try_from(level).unwrap_or(MAX_LEVEL).min(MAX_LEVEL)
}

/// averages a few charge readings into one brightness level
#[derive(Debug)]
pub struct AmbientLightSampler<S> {
    sensor: S,
    reads: u32,
}

impl<S: LightSensor> AmbientLightSampler<S> {
    /// `reads` readings per sample, at least one
    pub fn new(sensor: S, reads: u32) -> Self {
        Self {
            sensor,
            reads: reads.max(1),
        }
    }

    pub fn sample(&mut self) -> Result<u8> {
        let mut total = 0;
        for _ in 0..self.reads {
            total += self.sensor.charge_count()?;
        }
        Ok(level_from_charge(total / self.reads))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<u32>);

    impl LightSensor for Fixed {
        fn charge_count(&mut self) -> Result<u32> {
            Ok(self.0.pop().unwrap_or(0))
        }
    }

    #[test]
    fn bright_room_is_full_brightness() {
        assert_eq!(level_from_charge(0), 15);
        assert_eq!(level_from_charge(10), 15);
    }

    #[test]
    fn dark_room_is_lowest_level() {
        assert_eq!(level_from_charge(400), 0);
        assert_eq!(level_from_charge(5000), 0);
    }

    #[test]
    fn middle_of_the_range() {
        // 400 - 140 = 260, 260 / 26 = 10
        assert_eq!(level_from_charge(140), 10);
    }

    #[test]
    fn sampler_averages_reads() {
        let mut sampler = AmbientLightSampler::new(Fixed(vec![100, 180, 140]), 3);
        assert_eq!(sampler.sample().unwrap(), 10);
    }
}
