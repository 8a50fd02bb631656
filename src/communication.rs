use std::time::Duration;

/// one finished press of the button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub press_duration: Duration,
}

impl ButtonEvent {
    #[must_use]
    pub const fn new(press_duration: Duration) -> Self {
        Self { press_duration }
    }

    #[must_use]
    pub fn press_duration_seconds(&self) -> f32 {
        self.press_duration.as_secs_f32()
    }
}

/// sent from the button monitor to the button handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonSignal {
    /// the button just went down
    Pressed,
    /// the hold has been measured, sent while it may still be down
    Held(ButtonEvent),
    /// the button is up again
    Released,
}

/// sent from the button handler to the alarm loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    /// say when the next alarm goes off
    DescribeNextAlarm,
    /// the user confirmed powering off
    Shutdown,
}
