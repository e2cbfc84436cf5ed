//! Read-side aggregation over users and attendance records.
//!
//! All functions take the current time in the kiosk's local offset; record
//! timestamps are converted to that offset before being bucketed by day or
//! hour.

use crate::types::{AttendanceRecord, AttendanceStatus, User};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

const TREND_DAYS: i64 = 7;
const CONFIDENCE_TREND_DAYS: usize = 10;
const MOST_LATE_LIMIT: usize = 5;
const PEAK_FIRST_HOUR: usize = 6;
const PEAK_LAST_HOUR: usize = 20;
const NO_TIME: &str = "--:--";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: NaiveDate,
    pub total_users: usize,
    pub present: usize,
    pub absent: usize,
    /// Rounded percentage of registered users present today.
    pub attendance_rate: u32,
    /// Mean check-in time today as `HH:MM`, `--:--` when nobody checked in.
    pub avg_check_in: String,
    pub latest_check_in: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourCount {
    pub hour: String,
    pub attendees: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayConfidence {
    pub date: NaiveDate,
    /// Mean confidence as a rounded percentage.
    pub accuracy: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LateCount {
    pub name: String,
    pub count: usize,
}

/// Everything the overview screen shows, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub summary: DailySummary,
    pub weekly_trend: Vec<DayCount>,
    pub peak_hours: Vec<HourCount>,
    pub confidence_trend: Vec<DayConfidence>,
    pub most_late: Vec<LateCount>,
}

pub fn dashboard(users: &[User], records: &[AttendanceRecord], now: DateTime<FixedOffset>) -> Dashboard {
    let offset = *now.offset();
    Dashboard {
        summary: daily_summary(users, records, now),
        weekly_trend: weekly_trend(records, now),
        peak_hours: peak_hours(&hourly_histogram(records, offset)),
        confidence_trend: confidence_trend(records, offset),
        most_late: most_late(records),
    }
}

fn local_date(ts: &DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

fn distinct_users_on<'a>(
    records: &'a [AttendanceRecord],
    date: NaiveDate,
    offset: FixedOffset,
) -> HashSet<&'a str> {
    records
        .iter()
        .filter(|r| local_date(&r.timestamp, offset) == date)
        .map(|r| r.user_id.as_str())
        .collect()
}

/// Number of distinct users with at least one record on `now`'s date.
pub fn present_today(records: &[AttendanceRecord], now: DateTime<FixedOffset>) -> usize {
    distinct_users_on(records, now.date_naive(), *now.offset()).len()
}

pub fn daily_summary(
    users: &[User],
    records: &[AttendanceRecord],
    now: DateTime<FixedOffset>,
) -> DailySummary {
    let offset = *now.offset();
    let today = now.date_naive();
    let present = present_today(records, now);
    let total_users = users.len();

    let today_millis: Vec<i64> = records
        .iter()
        .filter(|r| local_date(&r.timestamp, offset) == today)
        .map(|r| r.timestamp.timestamp_millis())
        .collect();

    let format_millis = |ms: i64| {
        DateTime::<Utc>::from_timestamp_millis(ms)
            .map(|t| t.with_timezone(&offset).format("%H:%M").to_string())
            .unwrap_or_else(|| NO_TIME.to_string())
    };

    let (avg_check_in, latest_check_in) = if today_millis.is_empty() {
        (NO_TIME.to_string(), NO_TIME.to_string())
    } else {
        let sum: i128 = today_millis.iter().map(|&ms| ms as i128).sum();
        let avg = (sum / today_millis.len() as i128) as i64;
        let latest = today_millis.iter().copied().max().unwrap_or(avg);
        (format_millis(avg), format_millis(latest))
    };

    let attendance_rate = if total_users > 0 {
        ((present as f64 / total_users as f64) * 100.0).round() as u32
    } else {
        0
    };

    DailySummary {
        date: today,
        total_users,
        present,
        absent: total_users.saturating_sub(present),
        attendance_rate,
        avg_check_in,
        latest_check_in,
    }
}

/// Distinct users per day for the last seven days, oldest first.
pub fn weekly_trend(records: &[AttendanceRecord], now: DateTime<FixedOffset>) -> Vec<DayCount> {
    let offset = *now.offset();
    let today = now.date_naive();
    (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today - Duration::days(back);
            DayCount {
                date,
                count: distinct_users_on(records, date, offset).len(),
            }
        })
        .collect()
}

/// Record count per local hour of day.
pub fn hourly_histogram(records: &[AttendanceRecord], offset: FixedOffset) -> [usize; 24] {
    let mut hours = [0usize; 24];
    for r in records {
        hours[r.timestamp.with_timezone(&offset).hour() as usize] += 1;
    }
    hours
}

/// The 06:00–20:00 slice of the hourly histogram.
pub fn peak_hours(histogram: &[usize; 24]) -> Vec<HourCount> {
    (PEAK_FIRST_HOUR..=PEAK_LAST_HOUR)
        .map(|h| HourCount {
            hour: format!("{h:02}:00"),
            attendees: histogram[h],
        })
        .collect()
}

/// Mean confidence per day, chronological, for the last ten days with data.
pub fn confidence_trend(records: &[AttendanceRecord], offset: FixedOffset) -> Vec<DayConfidence> {
    let mut by_day: BTreeMap<NaiveDate, (f64, usize)> = BTreeMap::new();
    for r in records {
        let entry = by_day.entry(local_date(&r.timestamp, offset)).or_default();
        entry.0 += r.confidence * 100.0;
        entry.1 += 1;
    }
    let days: Vec<DayConfidence> = by_day
        .into_iter()
        .map(|(date, (sum, n))| DayConfidence {
            date,
            accuracy: (sum / n as f64).round() as u32,
        })
        .collect();
    let skip = days.len().saturating_sub(CONFIDENCE_TREND_DAYS);
    days.into_iter().skip(skip).collect()
}

/// Top five names by number of `Late` records.
pub fn most_late(records: &[AttendanceRecord]) -> Vec<LateCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for r in records.iter().filter(|r| r.status == AttendanceStatus::Late) {
        *counts.entry(r.user_name.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<LateCount> = counts
        .into_iter()
        .map(|(name, count)| LateCount {
            name: name.to_string(),
            count,
        })
        .collect();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(MOST_LATE_LIMIT);
    ranked
}

/// All records, newest first.
pub fn history(records: &[AttendanceRecord]) -> Vec<&AttendanceRecord> {
    let mut sorted: Vec<&AttendanceRecord> = records.iter().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    sorted
}
