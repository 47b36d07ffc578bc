// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar helpers: event date parsing, month ranges and per-day bucketing.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::models::Event;

/// Key format for calendar buckets and range bounds.
pub const DATE_KEY_FORMAT: &str = "%Y-%m-%d";
const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// An event as shown on a calendar day.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CalendarEntry {
    pub name: String,
    pub date: String,
    pub description: String,
}

/// Parse an event date in either `YYYY-MM-DD HH:MM` or `YYYY-MM-DD` form.
pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
        .map(|dt| dt.date())
        .or_else(|_| NaiveDate::parse_from_str(raw, DATE_KEY_FORMAT))
        .ok()
}

/// First day of the month and first day of the following month.
pub fn month_bounds(year: i32, month: u32) -> Option<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let end = if month == 12 {
        NaiveDate::from_ymd_opt(year.checked_add(1)?, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((start, end))
}

/// Resolve `year`/`month` query values, falling back to `today`'s month
/// when either is missing, not a number, or out of range.
pub fn resolve_year_month(year: Option<&str>, month: Option<&str>, today: NaiveDate) -> (i32, u32) {
    let parsed = (|| {
        let year: i32 = match year {
            Some(y) => y.trim().parse().ok()?,
            None => today.year(),
        };
        let month: u32 = match month {
            Some(m) => m.trim().parse().ok()?,
            None => today.month(),
        };
        month_bounds(year, month).map(|_| (year, month))
    })();

    parsed.unwrap_or((today.year(), today.month()))
}

/// Group events by calendar day (`YYYY-MM-DD`).
///
/// Events whose date is missing or unparseable are skipped.
pub fn bucket_by_date(events: &[Event]) -> BTreeMap<String, Vec<CalendarEntry>> {
    let mut buckets: BTreeMap<String, Vec<CalendarEntry>> = BTreeMap::new();

    for event in events {
        let Some(day) = event.date.as_deref().and_then(parse_event_date) else {
            tracing::debug!(date = ?event.date, "Skipping event with unparseable date");
            continue;
        };
        let key = day.format(DATE_KEY_FORMAT).to_string();
        buckets.entry(key.clone()).or_default().push(CalendarEntry {
            name: event
                .name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| "Event".to_string()),
            date: key,
            description: event.text.clone().unwrap_or_default(),
        });
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, date: &str) -> Event {
        Event {
            name: Some(name.to_string()),
            date: Some(date.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_both_date_formats_bucket_to_same_day() {
        let events = vec![event("A", "2024-03-05 10:00"), event("B", "2024-03-05")];
        let buckets = bucket_by_date(&events);

        assert_eq!(buckets.len(), 1);
        let day = &buckets["2024-03-05"];
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].name, "A");
        assert_eq!(day[1].date, "2024-03-05");
    }

    #[test]
    fn test_unparseable_dates_are_skipped() {
        let events = vec![
            event("bad", "next tuesday"),
            Event::default(),
            event("ok", "2024-12-31"),
        ];
        let buckets = bucket_by_date(&events);
        assert_eq!(buckets.keys().collect::<Vec<_>>(), vec!["2024-12-31"]);
    }

    #[test]
    fn test_missing_name_and_text_get_defaults() {
        let e = Event {
            date: Some("2024-01-02".to_string()),
            ..Default::default()
        };
        let buckets = bucket_by_date(&[e]);
        let entry = &buckets["2024-01-02"][0];
        assert_eq!(entry.name, "Event");
        assert_eq!(entry.description, "");
    }

    #[test]
    fn test_month_bounds_wraps_december() {
        let (start, end) = month_bounds(2024, 12).unwrap();
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 12, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert!(month_bounds(2024, 13).is_none());
    }

    #[test]
    fn test_resolve_year_month_falls_back_to_today() {
        let today = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();

        assert_eq!(resolve_year_month(Some("2024"), Some("3"), today), (2024, 3));
        assert_eq!(resolve_year_month(None, None, today), (2026, 10));
        assert_eq!(resolve_year_month(Some("2024"), None, today), (2024, 10));
        assert_eq!(resolve_year_month(Some("abc"), Some("3"), today), (2026, 10));
        assert_eq!(resolve_year_month(Some("2024"), Some("0"), today), (2026, 10));
    }
}
