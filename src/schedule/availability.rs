//! Availability configuration and the resolver that turns it into concrete
//! open windows per date.
//!
//! Two layers: a recurring [`WeeklyTemplate`] and dated [`DateOverride`]s.
//! An override always wins for its date — holiday/blocked/vacation empty the
//! day, a custom override replaces the template's windows verbatim (never
//! merges). All validation happens on the write path, so resolution is a
//! pure read.

use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

use super::types::{DayWindows, TimeWindow};

/// Recurring weekly availability: one window list per weekday, plus the
/// mandatory idle time enforced between consecutive bookings.
///
/// Replaced wholesale on update; there are no partial patch semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WeeklyTemplate {
    pub monday: Vec<TimeWindow>,
    pub tuesday: Vec<TimeWindow>,
    pub wednesday: Vec<TimeWindow>,
    pub thursday: Vec<TimeWindow>,
    pub friday: Vec<TimeWindow>,
    pub saturday: Vec<TimeWindow>,
    pub sunday: Vec<TimeWindow>,
    pub buffer_minutes: u32,
}

impl WeeklyTemplate {
    pub fn windows_for(&self, weekday: Weekday) -> &[TimeWindow] {
        match weekday {
            Weekday::Mon => &self.monday,
            Weekday::Tue => &self.tuesday,
            Weekday::Wed => &self.wednesday,
            Weekday::Thu => &self.thursday,
            Weekday::Fri => &self.friday,
            Weekday::Sat => &self.saturday,
            Weekday::Sun => &self.sunday,
        }
    }

    /// Checks every day's windows: each `start < end`, none overlapping.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let days = [
            ("monday", &self.monday),
            ("tuesday", &self.tuesday),
            ("wednesday", &self.wednesday),
            ("thursday", &self.thursday),
            ("friday", &self.friday),
            ("saturday", &self.saturday),
            ("sunday", &self.sunday),
        ];
        for (label, windows) in days {
            validate_windows(label, windows)?;
        }
        Ok(())
    }
}

/// What an override does to its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    Holiday,
    Blocked,
    Custom,
    Vacation,
}

/// A dated exception to the weekly template.
///
/// Created and deleted by an administrator only; the engine never writes
/// overrides. At most one override exists per date — a later write replaces
/// the earlier one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateOverride {
    pub date: NaiveDate,
    pub kind: OverrideKind,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Replacement windows; only meaningful when `kind` is `Custom`.
    #[serde(default)]
    pub windows: Vec<TimeWindow>,
}

impl DateOverride {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        match self.kind {
            OverrideKind::Custom => validate_windows("override", &self.windows),
            _ if !self.windows.is_empty() => Err(ScheduleError::InvalidAvailability(
                "windows are only allowed on custom overrides".into(),
            )),
            _ => Ok(()),
        }
    }

    /// The windows this override leaves open on its date.
    pub fn effective_windows(&self) -> &[TimeWindow] {
        match self.kind {
            OverrideKind::Custom => &self.windows,
            _ => &[],
        }
    }
}

/// The administered availability state: current template plus overrides,
/// keyed by date. The single source of truth every consumer reads through
/// [`AvailabilityStore::resolve_windows`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct AvailabilityStore {
    pub template: WeeklyTemplate,
    pub overrides: HashMap<NaiveDate, DateOverride>,
}

impl AvailabilityStore {
    /// Replaces the weekly template after validating it.
    pub fn set_template(&mut self, template: WeeklyTemplate) -> Result<(), ScheduleError> {
        template.validate()?;
        self.template = template;
        Ok(())
    }

    /// Inserts or replaces the override for its date after validating it.
    pub fn upsert_override(&mut self, date_override: DateOverride) -> Result<(), ScheduleError> {
        date_override.validate()?;
        self.overrides.insert(date_override.date, date_override);
        Ok(())
    }

    /// Removes the override for a date; returns whether one existed.
    pub fn remove_override(&mut self, date: NaiveDate) -> bool {
        self.overrides.remove(&date).is_some()
    }

    /// Resolves concrete open windows for each date in `[start, end]`.
    ///
    /// A date with an empty template entry and no override yields zero
    /// windows — that is a valid quiet day, not an error. Windows come back
    /// sorted by start time.
    pub fn resolve_windows(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<DayWindows>, ScheduleError> {
        if start > end {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        let mut days = Vec::new();
        for date in start.iter_days().take_while(|d| *d <= end) {
            let mut windows = match self.overrides.get(&date) {
                Some(o) => o.effective_windows().to_vec(),
                None => self.template.windows_for(date.weekday()).to_vec(),
            };
            windows.sort_by_key(|w| w.start);
            days.push(DayWindows { date, windows });
        }
        Ok(days)
    }
}

fn validate_windows(label: &str, windows: &[TimeWindow]) -> Result<(), ScheduleError> {
    for w in windows {
        if !w.is_valid() {
            return Err(ScheduleError::InvalidAvailability(format!(
                "{label}: window must start before it ends"
            )));
        }
    }
    let mut sorted = windows.to_vec();
    sorted.sort_by_key(|w| w.start);
    for pair in sorted.windows(2) {
        if pair[1].start < pair[0].end {
            return Err(ScheduleError::InvalidAvailability(format!(
                "{label}: windows overlap"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn monday_template() -> WeeklyTemplate {
        WeeklyTemplate {
            monday: vec![TimeWindow::new(t(9, 0), t(12, 0))],
            buffer_minutes: 15,
            ..WeeklyTemplate::default()
        }
    }

    #[test]
    fn test_template_day_resolution() {
        let store = AvailabilityStore {
            template: monday_template(),
            ..AvailabilityStore::default()
        };
        // 2026-01-05 is a Monday, 2026-01-06 a Tuesday
        let days = store.resolve_windows(d(2026, 1, 5), d(2026, 1, 6)).unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0].windows, vec![TimeWindow::new(t(9, 0), t(12, 0))]);
        assert!(days[1].windows.is_empty()); // no template entry for Tuesday
    }

    #[test]
    fn test_invalid_range_rejected() {
        let store = AvailabilityStore::default();
        let err = store.resolve_windows(d(2026, 1, 6), d(2026, 1, 5)).unwrap_err();
        assert!(matches!(err, ScheduleError::InvalidRange { .. }));
    }

    #[test]
    fn test_holiday_override_empties_templated_day() {
        let mut store = AvailabilityStore {
            template: monday_template(),
            ..AvailabilityStore::default()
        };
        store
            .upsert_override(DateOverride {
                date: d(2026, 1, 5),
                kind: OverrideKind::Holiday,
                title: Some("New year break".into()),
                description: None,
                windows: vec![],
            })
            .unwrap();
        let days = store.resolve_windows(d(2026, 1, 5), d(2026, 1, 5)).unwrap();
        assert!(days[0].windows.is_empty());
    }

    #[test]
    fn test_custom_override_replaces_template() {
        let mut store = AvailabilityStore {
            template: monday_template(),
            ..AvailabilityStore::default()
        };
        store
            .upsert_override(DateOverride {
                date: d(2026, 1, 5),
                kind: OverrideKind::Custom,
                title: None,
                description: None,
                windows: vec![TimeWindow::new(t(14, 0), t(16, 0))],
            })
            .unwrap();
        let days = store.resolve_windows(d(2026, 1, 5), d(2026, 1, 5)).unwrap();
        // replaced, not merged with the 09:00-12:00 template window
        assert_eq!(days[0].windows, vec![TimeWindow::new(t(14, 0), t(16, 0))]);
    }

    #[test]
    fn test_later_override_replaces_earlier() {
        let mut store = AvailabilityStore::default();
        let date = d(2026, 1, 5);
        for kind in [OverrideKind::Blocked, OverrideKind::Vacation] {
            store
                .upsert_override(DateOverride {
                    date,
                    kind,
                    title: None,
                    description: None,
                    windows: vec![],
                })
                .unwrap();
        }
        assert_eq!(store.overrides.len(), 1);
        assert_eq!(store.overrides[&date].kind, OverrideKind::Vacation);
    }

    #[test]
    fn test_template_validation_rejects_overlap() {
        let template = WeeklyTemplate {
            monday: vec![
                TimeWindow::new(t(9, 0), t(11, 0)),
                TimeWindow::new(t(10, 30), t(12, 0)),
            ],
            ..WeeklyTemplate::default()
        };
        assert!(template.validate().is_err());
    }

    #[test]
    fn test_template_validation_accepts_touching_windows() {
        let template = WeeklyTemplate {
            monday: vec![
                TimeWindow::new(t(9, 0), t(11, 0)),
                TimeWindow::new(t(11, 0), t(12, 0)),
            ],
            ..WeeklyTemplate::default()
        };
        assert!(template.validate().is_ok());
    }

    #[test]
    fn test_non_custom_override_rejects_windows() {
        let o = DateOverride {
            date: d(2026, 1, 5),
            kind: OverrideKind::Holiday,
            title: None,
            description: None,
            windows: vec![TimeWindow::new(t(9, 0), t(10, 0))],
        };
        assert!(o.validate().is_err());
    }
}
