//! gpio pins through the linux sysfs interface (`/sys/class/gpio`)

use std::{
    fs,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use embedded_hal::digital::{ErrorType, InputPin, OutputPin};
use log::debug;

use crate::error::{Error, Result};

const SYSFS_ROOT: &str = "/sys/class/gpio";
/// udev needs a moment to hand the freshly exported files to our group
const EXPORT_WAIT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug)]
pub struct SysfsPin {
    number: u32,
    dir: PathBuf,
}

impl SysfsPin {
    /// exports `number` if needed and opens it
    pub fn export(number: u32) -> Result<Self> {
        Self::export_in(Path::new(SYSFS_ROOT), number)
    }

    /// like [`Self::export`] below another sysfs root
    pub fn export_in(root: &Path, number: u32) -> Result<Self> {
        let pin = Self {
            number,
            dir: root.join(format!("gpio{number}")),
        };
        if !pin.dir.exists() {
            debug!("exporting gpio {number}");
            fs::write(root.join("export"), number.to_string()).map_err(|e| pin.error(e))?;
            let start = Instant::now();
            while !pin.dir.join("value").exists() && start.elapsed() < EXPORT_WAIT {
                thread::sleep(Duration::from_millis(10));
            }
        }
        Ok(pin)
    }

    #[must_use]
    pub const fn number(&self) -> u32 {
        self.number
    }

    pub fn into_input(self) -> Result<Self> {
        self.set_direction(Direction::In)?;
        Ok(self)
    }

    /// switches to output, starting at `high`
    pub fn into_output(self, high: bool) -> Result<Self> {
        // "low"/"high" set direction and level in one write
        let direction = if high { "high" } else { "low" };
        fs::write(self.dir.join("direction"), direction).map_err(|e| self.error(e))?;
        Ok(self)
    }

    pub fn set_direction(&self, direction: Direction) -> Result<()> {
        let direction = match direction {
            Direction::In => "in",
            Direction::Out => "out",
        };
        fs::write(self.dir.join("direction"), direction).map_err(|e| self.error(e))
    }

    pub fn read(&self) -> Result<bool> {
        let value = fs::read_to_string(self.dir.join("value")).map_err(|e| self.error(e))?;
        Ok(value.trim() == "1")
    }

    pub fn write(&self, high: bool) -> Result<()> {
        fs::write(self.dir.join("value"), if high { "1" } else { "0" }).map_err(|e| self.error(e))
    }

    fn error(&self, source: std::io::Error) -> Error {
        Error::Gpio {
            pin: self.number,
            source,
        }
    }
}

impl ErrorType for SysfsPin {
    type Error = Error;
}

impl InputPin for SysfsPin {
    fn is_high(&mut self) -> std::result::Result<bool, Self::Error> {
        self.read()
    }

    fn is_low(&mut self) -> std::result::Result<bool, Self::Error> {
        self.read().map(|high| !high)
    }
}

impl OutputPin for SysfsPin {
    fn set_low(&mut self) -> std::result::Result<(), Self::Error> {
        self.write(false)
    }

    fn set_high(&mut self) -> std::result::Result<(), Self::Error> {
        self.write(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_sysfs(name: &str, number: u32) -> PathBuf {
        let root = std::env::temp_dir().join(format!("smart_alarm_gpio_{name}_{}", std::process::id()));
        let pin = root.join(format!("gpio{number}"));
        fs::create_dir_all(&pin).unwrap();
        fs::write(pin.join("direction"), "in").unwrap();
        fs::write(pin.join("value"), "0\n").unwrap();
        root
    }

    #[test]
    fn reads_and_writes_levels() {
        let root = fake_sysfs("levels", 24);
        let mut pin = SysfsPin::export_in(&root, 24).unwrap().into_output(true).unwrap();
        assert_eq!(fs::read_to_string(root.join("gpio24/direction")).unwrap(), "high");

        pin.set_low().unwrap();
        assert!(pin.is_low().unwrap());
        pin.set_high().unwrap();
        assert!(pin.is_high().unwrap());
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn missing_pin_reports_its_number() {
        let root = std::env::temp_dir().join(format!("smart_alarm_gpio_none_{}", std::process::id()));
        fs::create_dir_all(&root).unwrap();
        // no export file to write to
        let root = root.join("missing");
        let err = SysfsPin::export_in(&root, 7).unwrap_err();
        assert!(matches!(err, Error::Gpio { pin: 7, .. }));
    }
}
