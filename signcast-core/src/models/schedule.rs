use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use super::id::{GroupId, ScheduleId};
use crate::{Error, Result};

/// Time of day at minute resolution, parsed from `HH:MM`.
///
/// Minute resolution is deliberate: a schedule whose start equals its end
/// matches exactly that minute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    minutes: u16,
}

impl TimeOfDay {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::InvalidInput(format!(
                "Time out of range: {hour:02}:{minute:02}"
            )));
        }
        Ok(Self {
            minutes: (hour * 60 + minute) as u16,
        })
    }

    #[must_use]
    pub const fn minutes_since_midnight(&self) -> u16 {
        self.minutes
    }

    #[must_use]
    pub fn from_datetime<Tz: chrono::TimeZone>(dt: &chrono::DateTime<Tz>) -> Self {
        use chrono::Timelike;
        Self {
            minutes: (dt.hour() * 60 + dt.minute()) as u16,
        }
    }

    /// Window membership with midnight wrap: `start <= t <= end` for a
    /// normal window, `t >= start || t <= end` for one that wraps.
    #[must_use]
    pub fn in_window(self, start: Self, end: Self) -> bool {
        if start <= end {
            start <= self && self <= end
        } else {
            self >= start || self <= end
        }
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| Error::InvalidInput(format!("Malformed time: {s:?}")))?;
        let hour: u32 = h
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Malformed time: {s:?}")))?;
        let minute: u32 = m
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Malformed time: {s:?}")))?;
        Self::new(hour, minute)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Days-of-week membership as a 7-bit mask, Monday first.
///
/// The wire encoding is a string of digit characters `'0'..'6'` over
/// Monday..Sunday; membership is character inclusion. The empty string
/// never matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DaySet(u8);

impl DaySet {
    pub const ALL: Self = Self(0b0111_1111);
    pub const EMPTY: Self = Self(0);

    /// `day` is 0 = Monday .. 6 = Sunday.
    #[must_use]
    pub const fn contains(self, day: u32) -> bool {
        day < 7 && self.0 & (1 << day) != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromStr for DaySet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut mask = 0u8;
        for c in s.chars() {
            match c.to_digit(10) {
                Some(d @ 0..=6) => mask |= 1 << d,
                _ => {
                    return Err(Error::InvalidInput(format!(
                        "Invalid day character {c:?} in {s:?}"
                    )))
                }
            }
        }
        Ok(Self(mask))
    }
}

impl fmt::Display for DaySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for day in 0..7 {
            if self.contains(day) {
                write!(f, "{day}")?;
            }
        }
        Ok(())
    }
}

impl Serialize for DaySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DaySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Item boundary treatment when the cycle advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Cut,
    Dissolve,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "type")]
    pub kind: TransitionKind,
    /// Crossfade length in seconds; 0 for cut.
    pub duration: f64,
}

impl Transition {
    #[must_use]
    pub const fn cut() -> Self {
        Self {
            kind: TransitionKind::Cut,
            duration: 0.0,
        }
    }

    #[must_use]
    pub const fn dissolve(duration: f64) -> Self {
        Self {
            kind: TransitionKind::Dissolve,
            duration,
        }
    }
}

impl Default for Transition {
    fn default() -> Self {
        Self::cut()
    }
}

/// A time-window rule inside a schedule group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub group_id: GroupId,
    pub name: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub days: DaySet,
    /// Higher priority wins conflicts; ties go to the smaller id.
    pub priority: i32,
    pub is_active: bool,
}

impl Schedule {
    #[must_use]
    pub fn matches_day(&self, day: u32) -> bool {
        self.days.contains(day)
    }

    #[must_use]
    pub fn matches_time(&self, t: TimeOfDay) -> bool {
        t.in_window(self.start, self.end)
    }
}

/// Logical bundle of content and time-window rules; the unit of binding to
/// a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleGroup {
    pub id: GroupId,
    pub name: String,
    pub is_active: bool,
    pub transition: Transition,
}
