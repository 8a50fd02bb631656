//! the per tick alarm decision, kept free of hardware so it can be driven
//! by tests minute by minute

use chrono::{Datelike, NaiveDateTime, Weekday};

use crate::alarm::AlarmConfig;

/// ticks averaged into one display brightness update
pub const BRIGHTNESS_WINDOW: u32 = 5;

/// what a tick has to start besides refreshing the display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Idle,
    /// start the wake-up message and content
    Trigger,
    /// one minute before the alarm, make sure the network is up
    ReassertNetwork,
}

/// loop state carried from one tick to the next
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickState {
    pub now: NaiveDateTime,
    pub minutes_to_alarm: i32,
    pub just_played_alarm: bool,
    pub just_checked_connectivity: bool,
    pub blink_phase: bool,
    pub brightness_accumulator: u32,
    pub brightness_sample_count: u32,
}

impl TickState {
    #[must_use]
    pub fn today(&self) -> Weekday {
        self.now.weekday()
    }

    /// adds one brightness level (0..=15) and returns the mean of the
    /// window once it is full
    pub fn record_brightness(&mut self, level: u8) -> Option<u8> {
        self.brightness_accumulator += u32::from(level);
        self.brightness_sample_count += 1;
        if self.brightness_sample_count < BRIGHTNESS_WINDOW {
            return None;
        }
        let mean = self.brightness_accumulator / self.brightness_sample_count;
        self.brightness_accumulator = 0;
        self.brightness_sample_count = 0;
        Some(u8::try_from(mean).unwrap_or(u8::MAX))
    }
}

/// decides what this tick does and returns the state for the next one.
///
/// the alarm fires on the tick where `minutes_to_alarm` hits zero on an
/// enabled day, and not again until the minute has passed, so the same
/// time fires again the next day.
#[must_use]
pub fn decide(config: &AlarmConfig, state: TickState, now: NaiveDateTime) -> (Action, TickState) {
    let minutes_to_alarm = config.minutes_to_alarm(now.time());
    let mut next = TickState {
        now,
        minutes_to_alarm,
        blink_phase: !state.blink_phase,
        ..state
    };

    let action = if config.active
        && config.days.contains(now.weekday())
        && minutes_to_alarm == 0
        && !state.just_played_alarm
    {
        next.just_played_alarm = true;
        Action::Trigger
    } else if minutes_to_alarm == 1 && !state.just_checked_connectivity {
        next.just_checked_connectivity = true;
        Action::ReassertNetwork
    } else {
        Action::Idle
    };

    if minutes_to_alarm != 0 {
        next.just_played_alarm = false;
    }
    if minutes_to_alarm != 1 {
        next.just_checked_connectivity = false;
    }
    (action, next)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::alarm::{AlarmTime, Weekdays};

    // 2024-03-04 is a monday
    fn monday(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn weekday_alarm() -> AlarmConfig {
        AlarmConfig {
            active: true,
            time: AlarmTime::new(6, 30).unwrap(),
            days: Weekdays::from_numbers(1..=5),
            ..AlarmConfig::default()
        }
    }

    /// runs the decision every half second from `start` for `ticks` ticks
    fn run(config: &AlarmConfig, start: NaiveDateTime, ticks: i64) -> Vec<(NaiveDateTime, Action)> {
        let mut state = TickState::default();
        (0..ticks)
            .map(|i| {
                let now = start + Duration::milliseconds(500 * i);
                let (action, next) = decide(config, state, now);
                state = next;
                (now, action)
            })
            .collect()
    }

    #[test]
    fn fires_once_per_alarm_minute() {
        let actions = run(&weekday_alarm(), monday(6, 29, 50), 60);
        let triggers: Vec<_> = actions
            .iter()
            .filter(|(_, a)| *a == Action::Trigger)
            .collect();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].0, monday(6, 30, 0));
    }

    #[test]
    fn fires_again_the_next_day() {
        let config = weekday_alarm();
        let (action, state) = decide(&config, TickState::default(), monday(6, 30, 0));
        assert_eq!(action, Action::Trigger);
        let (action, state) = decide(&config, state, monday(6, 30, 30));
        assert_eq!(action, Action::Idle);
        let (_, state) = decide(&config, state, monday(6, 31, 0));
        assert!(!state.just_played_alarm);
        let tuesday = monday(6, 30, 0) + Duration::days(1);
        assert_eq!(decide(&config, state, tuesday).0, Action::Trigger);
    }

    #[test]
    fn respects_active_flag_and_days() {
        let inactive = AlarmConfig {
            active: false,
            ..weekday_alarm()
        };
        assert_eq!(
            decide(&inactive, TickState::default(), monday(6, 30, 0)).0,
            Action::Idle
        );
        let sunday = monday(6, 30, 0) - Duration::days(1);
        assert_eq!(
            decide(&weekday_alarm(), TickState::default(), sunday).0,
            Action::Idle
        );
    }

    #[test]
    fn checks_connectivity_once_a_minute_ahead() {
        let actions = run(&weekday_alarm(), monday(6, 28, 30), 240);
        let checks: Vec<_> = actions
            .iter()
            .filter(|(_, a)| *a == Action::ReassertNetwork)
            .map(|(t, _)| *t)
            .collect();
        assert_eq!(checks, vec![monday(6, 29, 0)]);
    }

    #[test]
    fn blink_alternates_every_tick() {
        let config = weekday_alarm();
        let (_, a) = decide(&config, TickState::default(), monday(1, 0, 0));
        let (_, b) = decide(&config, a, monday(1, 0, 0));
        let (_, c) = decide(&config, b, monday(1, 0, 1));
        assert_eq!(
            [a.blink_phase, b.blink_phase, c.blink_phase],
            [true, false, true]
        );
    }

    #[test]
    fn brightness_is_averaged_over_the_window() {
        let mut state = TickState::default();
        let levels = [3, 5, 7, 9, 11];
        let updates: Vec<_> = levels
            .iter()
            .map(|&level| state.record_brightness(level))
            .collect();
        assert_eq!(updates, vec![None, None, None, None, Some(7)]);
        assert_eq!(state.brightness_sample_count, 0);
        assert_eq!(state.record_brightness(15), None);
    }
}
