// Calendar agenda: bucketing events into a four week grid
use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::home_assistant::CalendarEvent;

/// The grid always spans four weeks, whatever window was fetched
pub const GRID_DAYS: usize = 28;

fn default_days() -> u32 {
    7
}

/// A source calendar, optionally labelling its events with a prefix
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawCalendarSource")]
pub struct CalendarSource {
    pub id: String,
    pub prefix: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCalendarSource {
    Id(String),
    Labeled {
        id: String,
        #[serde(default)]
        prefix: Option<String>,
    },
}

impl From<RawCalendarSource> for CalendarSource {
    fn from(raw: RawCalendarSource) -> Self {
        match raw {
            RawCalendarSource::Id(id) => CalendarSource { id, prefix: None },
            RawCalendarSource::Labeled { id, prefix } => CalendarSource { id, prefix },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarSpec {
    pub name: String,
    pub ids: Vec<CalendarSource>,
    /// Days fetched from the start of the grid
    #[serde(default = "default_days")]
    pub days: u32,
    /// Global cap across the grid; zero disables it
    #[serde(default)]
    pub max_events: usize,
    #[serde(default)]
    pub skip_past_events: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarDay {
    pub date: NaiveDate,
    pub is_past: bool,
    pub is_today: bool,
    pub events: Vec<CalendarEvent>,
}

/// Monday on or before `today`
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today - Days::new(u64::from(today.weekday().num_days_from_monday()))
}

/// First instant of `date` in `tz`, falling back to UTC when the local
/// midnight does not exist
pub fn local_midnight<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    tz.from_local_datetime(&midnight)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|| midnight.and_utc())
}

/// Grid for a calendar: 28 days from the Monday of the current week, each
/// holding the events that touch it, ordered by start.
pub fn fill_calendar_days<Tz: TimeZone>(
    spec: &CalendarSpec,
    events: Vec<CalendarEvent>,
    now: &DateTime<Tz>,
) -> Vec<CalendarDay> {
    let tz = now.timezone();
    let today = now.date_naive();
    let start = window_start(today);

    let mut days: Vec<CalendarDay> = (0..GRID_DAYS as u64)
        .map(|offset| {
            let date = start + Days::new(offset);
            CalendarDay {
                date,
                is_past: date < today,
                is_today: date == today,
                events: Vec::new(),
            }
        })
        .collect();

    for event in events {
        let first = event.start.civil_date(&tz);
        // zero length events ending at midnight still occupy their start day
        let last = event.last_day(&tz).max(first);

        let Some(first_index) = days.iter().position(|day| day.date == first) else {
            continue;
        };

        for day in days[first_index..]
            .iter_mut()
            .take_while(|day| day.date <= last)
        {
            day.events.push(event.clone());
        }
    }

    for day in &mut days {
        day.events.sort_by_key(|event| event.start.instant(&tz));
    }

    if spec.skip_past_events {
        for day in days.iter_mut().filter(|day| day.is_past) {
            day.events.clear();
        }
    }

    if spec.max_events > 0 {
        let mut remaining = spec.max_events;
        for day in &mut days {
            day.events.truncate(remaining);
            remaining -= day.events.len();
        }
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::home_assistant::EventTime;
    use chrono::{FixedOffset, Weekday};

    fn spec() -> CalendarSpec {
        CalendarSpec {
            name: "family".to_string(),
            ids: vec![CalendarSource {
                id: "calendar.family".to_string(),
                prefix: None,
            }],
            days: 28,
            max_events: 0,
            skip_past_events: false,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(s: &str) -> EventTime {
        EventTime::DateTime(DateTime::parse_from_rfc3339(s).unwrap())
    }

    fn event(summary: &str, start: EventTime, end: EventTime) -> CalendarEvent {
        CalendarEvent {
            summary: summary.to_string(),
            start,
            end,
            description: None,
            location: None,
        }
    }

    // Wednesday
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap()
    }

    fn summaries(day: &CalendarDay) -> Vec<&str> {
        day.events.iter().map(|e| e.summary.as_str()).collect()
    }

    #[test]
    fn test_grid_is_28_contiguous_days_from_monday() {
        let days = fill_calendar_days(&spec(), Vec::new(), &now());
        assert_eq!(days.len(), GRID_DAYS);
        assert_eq!(days[0].date, date(2024, 4, 29));
        assert_eq!(days[0].date.weekday(), Weekday::Mon);
        for pair in days.windows(2) {
            assert_eq!(pair[0].date.succ_opt().unwrap(), pair[1].date);
        }
        assert!(days[0].is_past && days[1].is_past);
        assert!(days[2].is_today && !days[2].is_past);
        assert!(days[3..].iter().all(|d| !d.is_past && !d.is_today));
    }

    #[test]
    fn test_window_start_on_monday_and_sunday() {
        assert_eq!(window_start(date(2024, 4, 29)), date(2024, 4, 29));
        assert_eq!(window_start(date(2024, 5, 5)), date(2024, 4, 29));
    }

    #[test]
    fn test_events_outside_window_are_dropped() {
        let events = vec![
            event("before", at("2024-04-28T10:00:00Z"), at("2024-04-28T11:00:00Z")),
            event("after", at("2024-05-27T10:00:00Z"), at("2024-05-27T11:00:00Z")),
            // starts before the grid, so it is dropped even though it overlaps
            event("overlap", at("2024-04-27T10:00:00Z"), at("2024-04-30T11:00:00Z")),
        ];
        let days = fill_calendar_days(&spec(), events, &now());
        assert!(days.iter().all(|d| d.events.is_empty()));
    }

    #[test]
    fn test_multi_day_event_spans_every_bucket() {
        let events = vec![event(
            "trip",
            at("2024-05-02T08:00:00Z"),
            at("2024-05-05T18:00:00Z"),
        )];
        let days = fill_calendar_days(&spec(), events, &now());
        for day in &days {
            let expected = day.date >= date(2024, 5, 2) && day.date <= date(2024, 5, 5);
            assert_eq!(!day.events.is_empty(), expected, "{}", day.date);
        }
    }

    #[test]
    fn test_midnight_end_belongs_to_previous_day() {
        let events = vec![event(
            "conference",
            at("2024-05-01T00:00:00Z"),
            at("2024-05-03T00:00:00Z"),
        )];
        let days = fill_calendar_days(&spec(), events, &now());
        let occupied: Vec<NaiveDate> = days
            .iter()
            .filter(|d| !d.events.is_empty())
            .map(|d| d.date)
            .collect();
        assert_eq!(occupied, vec![date(2024, 5, 1), date(2024, 5, 2)]);
    }

    #[test]
    fn test_all_day_event_occupies_single_day() {
        let events = vec![event(
            "holiday",
            EventTime::Date(date(2024, 5, 9)),
            EventTime::Date(date(2024, 5, 10)),
        )];
        let days = fill_calendar_days(&spec(), events, &now());
        let occupied: Vec<NaiveDate> = days
            .iter()
            .filter(|d| !d.events.is_empty())
            .map(|d| d.date)
            .collect();
        assert_eq!(occupied, vec![date(2024, 5, 9)]);
    }

    #[test]
    fn test_zero_length_midnight_event_keeps_start_day() {
        let events = vec![event(
            "marker",
            at("2024-05-06T00:00:00Z"),
            at("2024-05-06T00:00:00Z"),
        )];
        let days = fill_calendar_days(&spec(), events, &now());
        assert_eq!(days[7].events.len(), 1);
        assert_eq!(days.iter().map(|d| d.events.len()).sum::<usize>(), 1);
    }

    #[test]
    fn test_events_sorted_by_start_with_stable_ties() {
        let events = vec![
            event("late", at("2024-05-01T15:00:00Z"), at("2024-05-01T16:00:00Z")),
            event("tie-a", at("2024-05-01T09:00:00Z"), at("2024-05-01T10:00:00Z")),
            event("all-day", EventTime::Date(date(2024, 5, 1)), EventTime::Date(date(2024, 5, 2))),
            event("tie-b", at("2024-05-01T09:00:00Z"), at("2024-05-01T09:30:00Z")),
        ];
        let days = fill_calendar_days(&spec(), events, &now());
        assert_eq!(summaries(&days[2]), vec!["all-day", "tie-a", "tie-b", "late"]);
    }

    #[test]
    fn test_skip_past_events() {
        let events = vec![
            event("monday", at("2024-04-29T10:00:00Z"), at("2024-04-29T11:00:00Z")),
            event("today", at("2024-05-01T10:00:00Z"), at("2024-05-01T11:00:00Z")),
        ];
        let mut spec = spec();
        spec.skip_past_events = true;
        let days = fill_calendar_days(&spec, events, &now());
        assert!(days.iter().filter(|d| d.is_past).all(|d| d.events.is_empty()));
        assert_eq!(summaries(&days[2]), vec!["today"]);
    }

    #[test]
    fn test_max_events_is_a_global_cap() {
        // grid starts Monday 2024-04-29
        let events = vec![
            event("a", at("2024-04-29T08:00:00Z"), at("2024-04-29T09:00:00Z")),
            event("b", at("2024-04-29T10:00:00Z"), at("2024-04-29T11:00:00Z")),
            event("c", at("2024-04-29T12:00:00Z"), at("2024-04-29T13:00:00Z")),
            event("d", at("2024-04-30T08:00:00Z"), at("2024-04-30T09:00:00Z")),
        ];
        let mut spec = spec();
        spec.days = 7;
        spec.max_events = 2;
        let days = fill_calendar_days(&spec, events, &now());
        assert_eq!(summaries(&days[0]), vec!["a", "b"]);
        assert!(days[1].events.is_empty());
        assert_eq!(days.iter().map(|d| d.events.len()).sum::<usize>(), 2);
    }

    #[test]
    fn test_max_events_cut_falls_mid_day() {
        let events = vec![
            event("a", at("2024-05-01T08:00:00Z"), at("2024-05-01T09:00:00Z")),
            event("b", at("2024-05-02T08:00:00Z"), at("2024-05-02T09:00:00Z")),
            event("c", at("2024-05-02T10:00:00Z"), at("2024-05-02T11:00:00Z")),
            event("d", at("2024-05-03T08:00:00Z"), at("2024-05-03T09:00:00Z")),
        ];
        let mut spec = spec();
        spec.max_events = 2;
        let days = fill_calendar_days(&spec, events, &now());
        assert_eq!(summaries(&days[2]), vec!["a"]);
        assert_eq!(summaries(&days[3]), vec!["b"]);
        assert!(days[4].events.is_empty());
    }

    #[test]
    fn test_is_deterministic() {
        let events = vec![
            event("x", at("2024-05-03T08:00:00Z"), at("2024-05-04T09:00:00Z")),
            event("y", at("2024-05-03T08:00:00Z"), at("2024-05-03T09:00:00Z")),
        ];
        let first = fill_calendar_days(&spec(), events.clone(), &now());
        let second = fill_calendar_days(&spec(), events, &now());
        assert_eq!(first, second);
    }

    #[test]
    fn test_today_follows_display_timezone() {
        // 23:30 UTC on Sunday is already Monday in UTC+2
        let now = FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 6, 1, 30, 0)
            .unwrap();
        let days = fill_calendar_days(&spec(), Vec::new(), &now);
        assert_eq!(days[0].date, date(2024, 5, 6));
        assert!(days[0].is_today);
    }

    #[test]
    fn test_deserialize_sources() {
        let spec: CalendarSpec = toml::from_str(
            r#"
            name = "family"
            ids = ["calendar.home", { id = "calendar.work", prefix = "W: " }]
            max_events = 5
            "#,
        )
        .unwrap();
        assert_eq!(spec.days, 7);
        assert!(!spec.skip_past_events);
        assert_eq!(spec.ids[0].prefix, None);
        assert_eq!(spec.ids[1].id, "calendar.work");
        assert_eq!(spec.ids[1].prefix.as_deref(), Some("W: "));
    }
}
