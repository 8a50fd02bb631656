use chrono::NaiveDateTime;

/// wall clock the alarm runs on
pub trait TimeSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// the system's local time zone
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTime;

impl TimeSource for LocalTime {
    fn now(&self) -> NaiveDateTime {
        chrono::Local::now().naive_local()
    }
}
