//! Working hours per barber and the bookable slot grid.
//!
//! Every time in this module is counted in minutes from midnight so the grid
//! arithmetic stays in integers; conversion to `NaiveTime` happens at the edges.

use std::collections::BTreeSet;

use anyhow::{anyhow, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};
use serde::Serialize;

use crate::models::{hhmm, Barber};

/// Width of one bookable interval.
pub const SLOT_MINUTES: u32 = 15;
/// Duration assumed when nothing is selected yet.
pub const DEFAULT_DURATION_MINUTES: u32 = 30;
/// A slot starting within this many minutes of now counts as past.
pub const PAST_GRACE_MINUTES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl WorkingWindow {
    pub const fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    /// Quarter-hour slot starts from the opening hour up to, not including, closing.
    pub fn slot_starts(&self) -> impl Iterator<Item = u32> {
        let start = self.start_hour * 60;
        let end = self.end_hour * 60;
        (start..end).step_by(SLOT_MINUTES as usize)
    }

    pub fn opens_at(&self) -> u32 {
        self.start_hour * 60
    }

    pub fn closes_at(&self) -> u32 {
        self.end_hour * 60
    }
}

/// Start-hour override applied to barbers whose name contains `needle`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRule {
    pub needle: String,
    pub start_hour: u32,
}

#[derive(Debug, Clone)]
pub struct ScheduleTable {
    pub weekday: WorkingWindow,
    pub monday: WorkingWindow,
    pub name_rules: Vec<NameRule>,
}

impl Default for ScheduleTable {
    fn default() -> Self {
        Self {
            weekday: WorkingWindow::new(10, 21),
            monday: WorkingWindow::new(12, 18),
            name_rules: vec![
                NameRule {
                    needle: "hamouda".to_string(),
                    start_hour: 12,
                },
                NameRule {
                    needle: "ahmed".to_string(),
                    start_hour: 11,
                },
            ],
        }
    }
}

impl ScheduleTable {
    pub fn with_name_rules(name_rules: Vec<NameRule>) -> Self {
        Self {
            name_rules,
            ..Self::default()
        }
    }

    /// Parses `needle=hour` pairs separated by commas, e.g. `hamouda=12,ahmed=11`.
    pub fn parse_name_rules(raw: &str) -> Result<Vec<NameRule>> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                let (needle, hour) = entry
                    .split_once('=')
                    .ok_or_else(|| anyhow!("invalid schedule rule '{}', expected name=hour", entry))?;
                let start_hour: u32 = hour
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("invalid start hour in schedule rule '{}'", entry))?;
                if start_hour > 23 {
                    return Err(anyhow!("start hour out of range in schedule rule '{}'", entry));
                }
                Ok(NameRule {
                    needle: needle.trim().to_lowercase(),
                    start_hour,
                })
            })
            .collect()
    }

    /// Monday hours apply to everyone. Otherwise the barber's own start hour
    /// wins, then the first matching name rule, then the shop default.
    pub fn window_for(&self, barber: &Barber, date: NaiveDate) -> WorkingWindow {
        if date.weekday() == Weekday::Mon {
            return self.monday;
        }

        if let Some(hour) = barber.start_hour.and_then(|h| u32::try_from(h).ok()) {
            return WorkingWindow::new(hour.min(self.weekday.end_hour), self.weekday.end_hour);
        }

        let name = barber.name.to_lowercase();
        self.name_rules
            .iter()
            .find(|rule| name.contains(&rule.needle))
            .map(|rule| WorkingWindow::new(rule.start_hour, self.weekday.end_hour))
            .unwrap_or(self.weekday)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(with = "hhmm")]
    pub time: NaiveTime,
    pub is_available: bool,
    pub is_past: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GridOptions {
    /// Emit past slots (flagged) instead of dropping them.
    pub keep_past: bool,
}

pub fn minutes_of(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub fn time_of(minutes: u32) -> NaiveTime {
    let minutes = minutes.min(24 * 60 - 1);
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0).unwrap_or_default()
}

/// Quarter-hours needed to fit `duration` minutes; zero means nothing selected.
pub fn slots_needed(duration: u32) -> u32 {
    let duration = if duration == 0 {
        DEFAULT_DURATION_MINUTES
    } else {
        duration
    };
    duration.div_ceil(SLOT_MINUTES)
}

pub fn build_slot_grid(
    window: WorkingWindow,
    required_minutes: u32,
    free_starts: &BTreeSet<NaiveTime>,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Vec<Slot> {
    build_slot_grid_with(
        window,
        required_minutes,
        free_starts,
        date,
        now,
        GridOptions::default(),
    )
}

pub fn build_slot_grid_with(
    window: WorkingWindow,
    required_minutes: u32,
    free_starts: &BTreeSet<NaiveTime>,
    date: NaiveDate,
    now: NaiveDateTime,
    options: GridOptions,
) -> Vec<Slot> {
    let free: BTreeSet<u32> = free_starts.iter().copied().map(minutes_of).collect();
    let needed = slots_needed(required_minutes);
    let starts: Vec<u32> = window.slot_starts().collect();
    let last_index = starts.len().saturating_sub(1);
    let cutoff = (date == now.date()).then(|| minutes_of(now.time()) + PAST_GRACE_MINUTES);

    starts
        .iter()
        .enumerate()
        .filter_map(|(index, &start)| {
            let is_past = cutoff.is_some_and(|cutoff| start <= cutoff);
            if is_past && !options.keep_past {
                return None;
            }

            // The closing slot may overrun the end of the day.
            let span = if index == last_index { 1 } else { needed };
            let is_available = (0..span).all(|step| free.contains(&(start + step * SLOT_MINUTES)));

            Some(Slot {
                time: time_of(start),
                is_available,
                is_past,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn barber(name: &str, start_hour: Option<i64>) -> Barber {
        Barber {
            id: 1,
            name: name.to_string(),
            speciality: "Barbier".to_string(),
            photo: String::new(),
            description: None,
            start_hour,
        }
    }

    fn all_free(window: WorkingWindow) -> BTreeSet<NaiveTime> {
        window.slot_starts().map(time_of).collect()
    }

    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 20).unwrap()
    }

    fn morning_of(date: NaiveDate) -> NaiveDateTime {
        date.and_hms_opt(8, 0, 0).unwrap()
    }

    #[test]
    fn fully_free_day_offers_every_quarter_hour() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let grid = build_slot_grid(window, 30, &all_free(window), date, morning_of(date));

        assert_eq!(grid.len(), 44);
        assert!(grid.iter().all(|slot| slot.is_available && !slot.is_past));
        for pair in grid.windows(2) {
            assert_eq!(minutes_of(pair[1].time) - minutes_of(pair[0].time), SLOT_MINUTES);
        }
        assert_eq!(grid[0].time, NaiveTime::from_hms_opt(10, 0, 0).unwrap());
        assert_eq!(grid[43].time, NaiveTime::from_hms_opt(20, 45, 0).unwrap());
    }

    #[test]
    fn scattered_free_minutes_never_fit_a_long_service() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let free: BTreeSet<NaiveTime> = window
            .slot_starts()
            .step_by(2)
            .map(time_of)
            .collect();

        let grid = build_slot_grid(window, 45, &free, date, morning_of(date));
        let last = grid.len() - 1;
        for (index, slot) in grid.iter().enumerate() {
            if index != last {
                assert!(!slot.is_available, "{} should not fit", slot.time);
            }
        }
    }

    #[test]
    fn past_slots_are_dropped_on_the_current_day() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let now = date.and_hms_opt(14, 7, 30).unwrap();
        let grid = build_slot_grid(window, 30, &all_free(window), date, now);

        let first = grid.first().unwrap();
        assert_eq!(first.time, NaiveTime::from_hms_opt(14, 15, 0).unwrap());
        assert!(grid.iter().all(|slot| minutes_of(slot.time) > 14 * 60 + 7 + PAST_GRACE_MINUTES));
    }

    #[test]
    fn slot_inside_grace_period_counts_as_past() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let now = date.and_hms_opt(14, 10, 0).unwrap();
        let grid = build_slot_grid(window, 30, &all_free(window), date, now);

        assert_eq!(grid[0].time, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
    }

    #[test]
    fn keep_past_flags_instead_of_dropping() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let now = date.and_hms_opt(12, 0, 0).unwrap();
        let grid = build_slot_grid_with(
            window,
            30,
            &all_free(window),
            date,
            now,
            GridOptions { keep_past: true },
        );

        assert_eq!(grid.len(), 44);
        assert!(grid[0].is_past);
        assert!(!grid.last().unwrap().is_past);
    }

    #[test]
    fn other_days_are_not_affected_by_the_clock() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let yesterday_evening = (date - chrono::Duration::days(1)).and_hms_opt(23, 0, 0).unwrap();
        let grid = build_slot_grid(window, 30, &all_free(window), date, yesterday_evening);

        assert_eq!(grid.len(), 44);
    }

    #[test]
    fn last_slot_only_needs_itself() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let free: BTreeSet<NaiveTime> = [time_of(20 * 60 + 45)].into_iter().collect();
        let grid = build_slot_grid(window, 90, &free, date, morning_of(date));

        let last = grid.last().unwrap();
        assert_eq!(last.time, NaiveTime::from_hms_opt(20, 45, 0).unwrap());
        assert!(last.is_available);
        assert_eq!(grid.iter().filter(|slot| slot.is_available).count(), 1);
    }

    #[test]
    fn slot_before_a_booking_is_unavailable_when_service_does_not_fit() {
        let window = WorkingWindow::new(10, 21);
        let date = tuesday();
        let mut free = all_free(window);
        free.remove(&time_of(11 * 60));

        let grid = build_slot_grid(window, 45, &free, date, morning_of(date));
        let lookup = |h: u32, m: u32| {
            grid.iter()
                .find(|slot| slot.time == time_of(h * 60 + m))
                .unwrap()
                .is_available
        };

        assert!(lookup(10, 0));
        assert!(lookup(10, 15));
        assert!(!lookup(10, 30));
        assert!(!lookup(10, 45));
        assert!(!lookup(11, 0));
        assert!(lookup(11, 15));
    }

    #[test]
    fn zero_duration_assumes_thirty_minutes() {
        assert_eq!(slots_needed(0), 2);
        assert_eq!(slots_needed(30), 2);
        assert_eq!(slots_needed(31), 3);
        assert_eq!(slots_needed(15), 1);
    }

    #[test]
    fn name_rule_shifts_the_opening_hour() {
        let table = ScheduleTable::default();
        let date = tuesday();

        let aladin = table.window_for(&barber("Aladin", None), date);
        let hamouda = table.window_for(&barber("Hamouda", None), date);
        let ahmed = table.window_for(&barber("AHMED", None), date);

        assert_eq!(aladin, WorkingWindow::new(10, 21));
        assert_eq!(hamouda, WorkingWindow::new(12, 21));
        assert_eq!(ahmed, WorkingWindow::new(11, 21));
        assert_eq!(hamouda.slot_starts().count(), 36);
    }

    #[test]
    fn explicit_start_hour_beats_name_rules() {
        let table = ScheduleTable::default();
        let window = table.window_for(&barber("Hamouda", Some(9)), tuesday());
        assert_eq!(window, WorkingWindow::new(9, 21));
    }

    #[test]
    fn monday_hours_apply_to_everyone() {
        let table = ScheduleTable::default();
        let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);

        for name in ["Aladin", "Hamouda", "Ahmed"] {
            assert_eq!(table.window_for(&barber(name, None), monday), WorkingWindow::new(12, 18));
        }
        assert_eq!(
            table.window_for(&barber("Aladin", Some(8)), monday),
            WorkingWindow::new(12, 18)
        );
    }

    #[test]
    fn parses_name_rules_from_config() {
        let rules = ScheduleTable::parse_name_rules(" Hamouda=12, ahmed = 11 ,").unwrap();
        assert_eq!(
            rules,
            vec![
                NameRule {
                    needle: "hamouda".to_string(),
                    start_hour: 12
                },
                NameRule {
                    needle: "ahmed".to_string(),
                    start_hour: 11
                },
            ]
        );

        assert!(ScheduleTable::parse_name_rules("hamouda").is_err());
        assert!(ScheduleTable::parse_name_rules("hamouda=noon").is_err());
        assert!(ScheduleTable::parse_name_rules("hamouda=30").is_err());
        assert!(ScheduleTable::parse_name_rules("").unwrap().is_empty());
    }
}
