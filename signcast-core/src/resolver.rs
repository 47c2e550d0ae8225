//! Schedule resolution: which schedule is active for a device right now,
//! and what playlist that implies.
//!
//! Pure with respect to stored data; the resolver performs no writes and is
//! safe to call concurrently.

use chrono::{DateTime, Datelike, TimeZone};
use serde::{Deserialize, Serialize};

use crate::models::{ContentItem, DaySet, Schedule, ScheduleGroup, TimeOfDay};

/// One row of the "why didn't my schedule fire?" diagnostic surface.
/// Part of the playlist JSON contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCheck {
    pub name: String,
    pub start: TimeOfDay,
    pub end: TimeOfDay,
    pub days: DaySet,
    pub is_active: bool,
    pub day_match: bool,
    pub time_match: bool,
    pub selected: bool,
}

/// Result of resolving a device's schedule group at one instant.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub active_schedule: Option<Schedule>,
    /// Active content items in display order; empty when no schedule
    /// matched or the group is empty or inactive.
    pub playlist: Vec<ContentItem>,
    /// The group has active content but no schedule matched. Informational
    /// only; the resolver never promotes to "play anyway".
    pub fallback_mode: bool,
    pub checks: Vec<ScheduleCheck>,
    pub total_schedules: usize,
    pub total_content: usize,
}

/// Resolve the active schedule and playlist for `group` at `now`.
///
/// Day-of-week is Monday-first (0..6). Priority wins conflicts; ties break
/// to the smallest schedule id so the outcome is deterministic.
#[must_use]
pub fn resolve<Tz: TimeZone>(
    group: Option<&ScheduleGroup>,
    schedules: &[Schedule],
    items: &[ContentItem],
    now: &DateTime<Tz>,
) -> Resolution {
    let Some(group) = group else {
        return Resolution::default();
    };
    if !group.is_active {
        return Resolution::default();
    }

    let dow = now.weekday().num_days_from_monday();
    let t = TimeOfDay::from_datetime(now);

    let selected = schedules
        .iter()
        .filter(|s| s.is_active && s.matches_day(dow) && s.matches_time(t))
        .max_by_key(|s| (s.priority, std::cmp::Reverse(s.id)));

    let checks = schedules
        .iter()
        .map(|s| ScheduleCheck {
            name: s.name.clone(),
            start: s.start,
            end: s.end,
            days: s.days,
            is_active: s.is_active,
            day_match: s.matches_day(dow),
            time_match: s.matches_time(t),
            selected: selected.is_some_and(|sel| sel.id == s.id),
        })
        .collect();

    let mut playlist: Vec<ContentItem> = if selected.is_some() {
        items.iter().filter(|i| i.is_active).cloned().collect()
    } else {
        Vec::new()
    };
    playlist.sort_by_key(|i| (i.order, i.id));

    let has_active_content = items.iter().any(|i| i.is_active);

    Resolution {
        active_schedule: selected.cloned(),
        playlist,
        fallback_mode: selected.is_none() && has_active_content,
        checks,
        total_schedules: schedules.len(),
        total_content: items.len(),
    }
}
