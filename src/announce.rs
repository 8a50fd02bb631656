use chrono::{Datelike, NaiveDateTime};

use crate::alarm::{minutes_since_midnight, AlarmTime, Weekdays};

const WEEKDAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

const MINUTES_PER_DAY: i32 = 24 * 60;

fn count(n: i32, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// the sentence spoken on a short button press, telling when the alarm
/// goes off next.
///
/// an alarm day equal to today whose time is not in the future counts as
/// passed, so the search moves on to the following days.
#[must_use]
pub fn describe_next_alarm(
    active: bool,
    days: Weekdays,
    time: AlarmTime,
    now: NaiveDateTime,
) -> String {
    if !active {
        return "No alarm set.".to_string();
    }
    if days.is_empty() {
        return "The alarm is on, but no days are selected.".to_string();
    }

    let today = now.weekday().num_days_from_sunday();
    let minutes_to_alarm = time.minutes_since_midnight() - minutes_since_midnight(now.time());

    if days.contains_number(today) && minutes_to_alarm > 0 {
        let (hours, minutes) = (minutes_to_alarm / 60, minutes_to_alarm % 60);
        return if hours == 0 {
            format!(
                "The next alarm is today, at {time}, which is in {}.",
                count(minutes, "minute")
            )
        } else {
            format!(
                "The next alarm is today, at {time}, which is in {} and {}.",
                count(hours, "hour"),
                count(minutes, "minute")
            )
        };
    }

    // at least one day is set, so this ends within a week
    let mut next_day = today;
    let mut days_to_alarm = 0;
    loop {
        days_to_alarm += 1;
        next_day = (next_day + 1) % 7;
        if days.contains_number(next_day) {
            break;
        }
    }
    let day_name = WEEKDAYS[next_day as usize];

    if minutes_to_alarm <= 0 {
        // the alarm time is still ahead within the last day of the wait
        let left = MINUTES_PER_DAY + minutes_to_alarm;
        let (hours, minutes) = (left / 60, left % 60);
        days_to_alarm -= 1;
        if days_to_alarm == 0 {
            format!(
                "The next alarm is tomorrow at {time}, which is in {} and {}.",
                count(hours, "hour"),
                count(minutes, "minute")
            )
        } else {
            format!(
                "The next alarm is on {day_name} at {time}, which is in {}, {} and {}.",
                count(days_to_alarm, "day"),
                count(hours, "hour"),
                count(minutes, "minute")
            )
        }
    } else {
        let (hours, minutes) = (minutes_to_alarm / 60, minutes_to_alarm % 60);
        if days_to_alarm == 1 {
            format!(
                "The next alarm is tomorrow at {time}, which is in one day, {} and {}.",
                count(hours, "hour"),
                count(minutes, "minute")
            )
        } else {
            format!(
                "The next alarm is on {day_name} at {time}, which is in {}, {} and {}.",
                count(days_to_alarm, "day"),
                count(hours, "hour"),
                count(minutes, "minute")
            )
        }
    }
}
