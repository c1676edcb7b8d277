use std::collections::BTreeSet;

use chrono::NaiveTime;
use log::warn;
use sqlx::FromRow;

use crate::models::{hhmm, AppointmentStatus, BlockedSlot};
use crate::schedule::{minutes_of, time_of, WorkingWindow, SLOT_MINUTES};

/// Length of a blocked slot that names a start but no end.
pub const BLOCK_DEFAULT_MINUTES: u32 = 30;

/// Half-open `[start, end)` range in minutes from midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

impl Interval {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(minutes_of(start), minutes_of(end))
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// An appointment already holding part of a barber's day.
#[derive(Debug, Clone, FromRow)]
pub struct Occupant {
    pub status: AppointmentStatus,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    Appointment,
    DayBlocked,
    SlotBlocked,
}

impl Conflict {
    pub fn message(self) -> &'static str {
        match self {
            Self::Appointment => "Slot not available (Conflict with appointment)",
            Self::DayBlocked => "Date is blocked by administrator",
            Self::SlotBlocked => "Slot is blocked by administrator",
        }
    }
}

/// What is taken on one barber's day.
#[derive(Debug, Clone, Default)]
pub struct DayOccupancy {
    pub whole_day_blocked: bool,
    pub appointments: Vec<Interval>,
    pub blocks: Vec<Interval>,
}

impl DayOccupancy {
    /// `occupants` and `blocks` must already be limited to the day in question;
    /// blocks for other barbers are skipped here.
    pub fn new(barber_id: i64, occupants: &[Occupant], blocks: &[BlockedSlot]) -> Self {
        let mut occupancy = Self {
            appointments: occupants
                .iter()
                .filter(|o| o.status.occupies_slot())
                .map(|o| Interval::from_times(o.start_time, o.end_time))
                .collect(),
            ..Self::default()
        };

        for block in blocks.iter().filter(|b| applies_to(b, barber_id)) {
            match block_interval(block) {
                BlockWindow::WholeDay => occupancy.whole_day_blocked = true,
                BlockWindow::Range(interval) => occupancy.blocks.push(interval),
                BlockWindow::Unreadable => warn!(
                    "Ignoring blocked slot {} with unreadable window '{:?}' - '{:?}'",
                    block.id, block.start_time, block.end_time
                ),
            }
        }

        occupancy
    }

    pub fn conflict(&self, wanted: Interval) -> Option<Conflict> {
        if self.whole_day_blocked {
            return Some(Conflict::DayBlocked);
        }
        if self.appointments.iter().any(|taken| taken.overlaps(&wanted)) {
            return Some(Conflict::Appointment);
        }
        if self.blocks.iter().any(|blocked| blocked.overlaps(&wanted)) {
            return Some(Conflict::SlotBlocked);
        }
        None
    }

    /// Quarter-hour starts inside `window` that nothing overlaps.
    pub fn free_starts(&self, window: WorkingWindow) -> BTreeSet<NaiveTime> {
        if self.whole_day_blocked {
            return BTreeSet::new();
        }
        window
            .slot_starts()
            .filter(|&start| self.conflict(Interval::new(start, start + SLOT_MINUTES)).is_none())
            .map(time_of)
            .collect()
    }
}

enum BlockWindow {
    WholeDay,
    Range(Interval),
    Unreadable,
}

fn applies_to(block: &BlockedSlot, barber_id: i64) -> bool {
    block.barber_id.map_or(true, |id| id == barber_id)
}

fn block_interval(block: &BlockedSlot) -> BlockWindow {
    let start = match block.start_time.as_deref().map(str::trim) {
        None | Some("") => return BlockWindow::WholeDay,
        Some(raw) => raw,
    };
    let Ok(start) = hhmm::parse(start).map(minutes_of) else {
        return BlockWindow::Unreadable;
    };

    let end = match block.end_time.as_deref().map(str::trim) {
        None | Some("") => start + BLOCK_DEFAULT_MINUTES,
        Some(raw) => match hhmm::parse(raw) {
            Ok(end) => minutes_of(end),
            Err(_) => return BlockWindow::Unreadable,
        },
    };

    BlockWindow::Range(Interval::new(start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn occupant(status: AppointmentStatus, start: NaiveTime, end: NaiveTime) -> Occupant {
        Occupant {
            status,
            start_time: start,
            end_time: end,
        }
    }

    fn block(barber_id: Option<i64>, start: Option<&str>, end: Option<&str>) -> BlockedSlot {
        BlockedSlot {
            id: 7,
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
            barber_id,
            reason: None,
        }
    }

    #[test]
    fn booked_appointment_removes_its_quarter_hours() {
        let occupancy = DayOccupancy::new(
            1,
            &[occupant(AppointmentStatus::Booked, t(10, 30), t(11, 15))],
            &[],
        );
        let free = occupancy.free_starts(WorkingWindow::new(10, 12));

        assert!(free.contains(&t(10, 15)));
        assert!(!free.contains(&t(10, 30)));
        assert!(!free.contains(&t(11, 0)));
        assert!(free.contains(&t(11, 15)));
        assert_eq!(free.len(), 5);
    }

    #[test]
    fn cancelled_and_done_appointments_do_not_occupy() {
        let occupancy = DayOccupancy::new(
            1,
            &[
                occupant(AppointmentStatus::Cancelled, t(10, 0), t(10, 30)),
                occupant(AppointmentStatus::Done, t(10, 30), t(11, 0)),
            ],
            &[],
        );
        assert_eq!(occupancy.free_starts(WorkingWindow::new(10, 11)).len(), 4);
    }

    #[test]
    fn whole_day_block_empties_the_day() {
        let occupancy = DayOccupancy::new(1, &[], &[block(None, None, None)]);
        assert!(occupancy.free_starts(WorkingWindow::new(10, 21)).is_empty());
        assert_eq!(
            occupancy.conflict(Interval::new(600, 630)),
            Some(Conflict::DayBlocked)
        );
    }

    #[test]
    fn blocks_for_other_barbers_are_ignored() {
        let occupancy = DayOccupancy::new(
            1,
            &[],
            &[block(Some(2), None, None), block(Some(2), Some("10:00"), Some("12:00"))],
        );
        assert!(!occupancy.whole_day_blocked);
        assert_eq!(occupancy.free_starts(WorkingWindow::new(10, 12)).len(), 8);
    }

    #[test]
    fn block_without_end_lasts_thirty_minutes() {
        let occupancy = DayOccupancy::new(1, &[], &[block(Some(1), Some("15:00"), None)]);
        let free = occupancy.free_starts(WorkingWindow::new(14, 16));

        assert!(free.contains(&t(14, 45)));
        assert!(!free.contains(&t(15, 0)));
        assert!(!free.contains(&t(15, 15)));
        assert!(free.contains(&t(15, 30)));
    }

    #[test]
    fn block_accepts_seconds_in_times() {
        let occupancy =
            DayOccupancy::new(1, &[], &[block(None, Some("10:00:00"), Some("10:15:00"))]);
        assert_eq!(occupancy.blocks, vec![Interval::new(600, 615)]);
    }

    #[test]
    fn unreadable_block_is_skipped() {
        let occupancy = DayOccupancy::new(1, &[], &[block(None, Some("noon"), None)]);
        assert!(occupancy.blocks.is_empty());
        assert!(!occupancy.whole_day_blocked);
    }

    #[test]
    fn conflicts_report_the_reason() {
        let occupancy = DayOccupancy::new(
            1,
            &[occupant(AppointmentStatus::Modified, t(10, 0), t(10, 30))],
            &[block(None, Some("12:00"), Some("13:00"))],
        );

        assert_eq!(
            occupancy.conflict(Interval::new(615, 645)),
            Some(Conflict::Appointment)
        );
        assert_eq!(
            occupancy.conflict(Interval::new(700, 730)),
            Some(Conflict::SlotBlocked)
        );
        assert_eq!(occupancy.conflict(Interval::new(630, 660)), None);
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        assert!(!Interval::new(600, 630).overlaps(&Interval::new(630, 660)));
        assert!(Interval::new(600, 631).overlaps(&Interval::new(630, 660)));
    }
}
