use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, Timelike, Weekday};
use log::warn;
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};

/// the alarm settings as the user edits them in `alarm.toml`.
///
/// every field is read leniently: a missing field takes its default and
/// an invalid one is logged and replaced by its default, so a half
/// written settings file never stops the clock.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmConfig {
    #[serde(deserialize_with = "lenient")]
    pub active: bool,
    #[serde(deserialize_with = "lenient")]
    pub time: AlarmTime,
    #[serde(deserialize_with = "lenient")]
    pub days: Weekdays,
    #[serde(rename = "content", deserialize_with = "lenient")]
    pub content_kind: ContentKind,
    #[serde(rename = "individual_message", deserialize_with = "lenient")]
    pub individual_message_active: bool,
    #[serde(rename = "message", deserialize_with = "lenient")]
    pub individual_message_text: String,
    #[serde(deserialize_with = "lenient")]
    pub volume: Volume,
    #[serde(deserialize_with = "lenient")]
    pub podcast_url: String,
    #[serde(deserialize_with = "lenient")]
    pub stream_url: String,
    #[serde(rename = "test_alarm", deserialize_with = "lenient")]
    pub test_alarm_requested: bool,
}

impl AlarmConfig {
    /// signed minutes from `now` until the alarm time of the same day
    #[must_use]
    pub fn minutes_to_alarm(&self, now: NaiveTime) -> i32 {
        self.time.minutes_since_midnight() - minutes_since_midnight(now)
    }

    /// the sentence spoken right before the wake-up content
    #[must_use]
    pub fn wake_up_message(&self, now: NaiveDateTime) -> String {
        if self.individual_message_active {
            self.individual_message_text.clone()
        } else {
            format!(
                "good morning. It is {}  {}",
                now.format("%A"),
                now.format("%H %M")
            )
        }
    }
}

pub(crate) fn minutes_since_midnight(time: NaiveTime) -> i32 {
    // hour < 24 and minute < 60, so this always fits
    (time.hour() * 60 + time.minute()) as i32
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = toml::Value::deserialize(deserializer)?;
    Ok(T::deserialize(value.clone()).unwrap_or_else(|e| {
        warn!("ignoring invalid alarm setting `{value}`: {e}");
        T::default()
    }))
}

/// what plays after the wake-up message
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// most recent episode of a podcast feed
    #[default]
    Podcast,
    /// the audio files in the offline music directory
    #[serde(alias = "mp3")]
    LocalAudio,
    /// an internet radio stream
    Stream,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Podcast => "podcast",
            Self::LocalAudio => "local audio",
            Self::Stream => "stream",
        })
    }
}

/// time of day the alarm goes off, minute resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmTime(NaiveTime);

impl AlarmTime {
    #[must_use]
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self)
    }

    #[must_use]
    pub fn minutes_since_midnight(self) -> i32 {
        minutes_since_midnight(self.0)
    }

    #[must_use]
    pub const fn time(self) -> NaiveTime {
        self.0
    }
}

impl Default for AlarmTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(7, 0, 0).unwrap_or_default())
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%H:%M"))
    }
}

impl std::str::FromStr for AlarmTime {
    type Err = chrono::ParseError;

    /// "HH:MM", or "HH:MM:SS" with the seconds dropped
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let time = NaiveTime::parse_from_str(s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))?;
        Ok(Self::new(time.hour(), time.minute()).unwrap_or(Self(time)))
    }
}

impl Serialize for AlarmTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AlarmTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        // accepts "07:30" as well as a bare toml time (07:30:00), which
        // arrives as a string once it went through a buffered `toml::Value`
        match toml::Value::deserialize(deserializer)? {
            toml::Value::String(s) => s.parse().map_err(D::Error::custom),
            toml::Value::Datetime(toml::value::Datetime {
                date: None,
                time: Some(t),
                ..
            }) => Self::new(t.hour.into(), t.minute.into())
                .ok_or_else(|| D::Error::custom("time out of range")),
            other => Err(D::Error::custom(format!("expected HH:MM, found {other}"))),
        }
    }
}

/// set of weekdays numbered like `%w`: 0 is sunday, 6 is saturday
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Weekdays(u8);

impl Weekdays {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// ignores numbers outside 0..=6
    #[must_use]
    pub fn from_numbers(days: impl IntoIterator<Item = u32>) -> Self {
        days.into_iter().fold(Self::empty(), |set, day| set.with(day))
    }

    #[must_use]
    pub const fn with(self, day: u32) -> Self {
        if day < 7 {
            Self(self.0 | 1 << day)
        } else {
            self
        }
    }

    #[must_use]
    pub const fn contains_number(self, day: u32) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }

    #[must_use]
    pub fn contains(self, day: Weekday) -> bool {
        self.contains_number(day.num_days_from_sunday())
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn numbers(self) -> impl Iterator<Item = u32> {
        (0..7).filter(move |&day| self.contains_number(day))
    }
}

impl Serialize for Weekdays {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.numbers())
    }
}

impl<'de> Deserialize<'de> for Weekdays {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error;
        // [1, 2, 3] or the compact "123" form
        let numbers: Vec<i64> = match toml::Value::deserialize(deserializer)? {
            toml::Value::Array(days) => days
                .iter()
                .map(|day| {
                    day.as_integer()
                        .ok_or_else(|| D::Error::custom(format!("day `{day}` is not a number")))
                })
                .collect::<Result<_, _>>()?,
            toml::Value::String(days) => days
                .chars()
                .filter(|c| !c.is_whitespace() && *c != ',')
                .map(|c| {
                    c.to_digit(10)
                        .map(i64::from)
                        .ok_or_else(|| D::Error::custom(format!("day `{c}` is not a number")))
                })
                .collect::<Result<_, _>>()?,
            other => return Err(D::Error::custom(format!("expected days, found {other}"))),
        };
        Ok(Self::from_numbers(numbers.into_iter().filter_map(|day| {
            let valid = u32::try_from(day).ok().filter(|day| *day < 7);
            if valid.is_none() {
                warn!("dropping weekday {day}, days are numbered 0 (sunday) to 6");
            }
            valid
        })))
    }
}

/// playback volume in percent
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Volume(u8);

impl Volume {
    /// clamps to 0..=100
    #[must_use]
    pub fn new(percent: i64) -> Self {
        Self(percent.clamp(0, 100) as u8)
    }

    #[must_use]
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// volume as the 0.0..=1.0 factor rodio expects
    #[must_use]
    pub fn gain(self) -> f32 {
        f32::from(self.0) / 100.0
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self(80)
    }
}

impl Serialize for Volume {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.0)
    }
}

impl<'de> Deserialize<'de> for Volume {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::new)
    }
}
