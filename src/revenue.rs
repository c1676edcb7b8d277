use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

use crate::models::{AppointmentStatus, AppointmentView};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueDetail {
    pub appointment_id: i64,
    pub client_name: String,
    pub services: String,
    pub price: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub details: Vec<RevenueDetail>,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRevenue {
    pub week_number: u32,
    pub year: i32,
    /// e.g. "09 mar - 15 mar"
    pub week_range: String,
    pub details: Vec<RevenueDetail>,
    pub total_revenue: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueReport {
    pub barber_id: i64,
    pub barber_name: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub daily_revenues: Vec<DailyRevenue>,
    pub weekly_revenues: Vec<WeeklyRevenue>,
}

/// Monday through Sunday of the week holding `reference`.
pub fn week_bounds(reference: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = reference.week(Weekday::Mon).first_day();
    (start, start + Duration::days(6))
}

fn detail(appointment: &AppointmentView) -> RevenueDetail {
    RevenueDetail {
        appointment_id: appointment.id,
        client_name: appointment
            .user
            .as_ref()
            .map(|u| u.name.clone())
            .unwrap_or_else(|| "Guest".to_string()),
        services: appointment
            .services
            .iter()
            .map(|s| s.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        price: appointment.total_price,
        date: appointment.date,
    }
}

fn week_range(start: NaiveDate, end: NaiveDate) -> String {
    format!("{} - {}", start.format("%d %b"), end.format("%d %b")).to_lowercase()
}

/// Builds the weekly report from the barber's appointments. Only completed
/// appointments inside the week count; everything else is ignored.
pub fn build_report(
    barber_id: i64,
    barber_name: &str,
    reference: NaiveDate,
    appointments: &[AppointmentView],
) -> RevenueReport {
    let (week_start, week_end) = week_bounds(reference);

    let mut done: Vec<&AppointmentView> = appointments
        .iter()
        .filter(|a| a.status == AppointmentStatus::Done)
        .filter(|a| a.date >= week_start && a.date <= week_end)
        .collect();
    done.sort_by_key(|a| (a.date, a.start_time));

    let mut by_date: BTreeMap<NaiveDate, Vec<RevenueDetail>> = BTreeMap::new();
    for appointment in &done {
        by_date
            .entry(appointment.date)
            .or_default()
            .push(detail(appointment));
    }

    let daily_revenues = by_date
        .into_iter()
        .map(|(date, details)| DailyRevenue {
            date,
            total_revenue: details.iter().map(|d| d.price).sum(),
            details,
        })
        .collect();

    let weekly_revenues = if done.is_empty() {
        Vec::new()
    } else {
        let details: Vec<RevenueDetail> = done.iter().map(|a| detail(a)).collect();
        vec![WeeklyRevenue {
            week_number: week_start.iso_week().week(),
            year: week_start.year(),
            week_range: week_range(week_start, week_end),
            total_revenue: details.iter().map(|d| d.price).sum(),
            details,
        }]
    };

    RevenueReport {
        barber_id,
        barber_name: barber_name.to_string(),
        week_start,
        week_end,
        daily_revenues,
        weekly_revenues,
    }
}
