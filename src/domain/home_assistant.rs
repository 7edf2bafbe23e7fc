// Home Assistant data as consumed by dashboard templates
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::calendar::{local_midnight, CalendarDay};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub last_changed: DateTime<FixedOffset>,
    pub last_updated: DateTime<FixedOffset>,
}

/// Start or end of a calendar event: a whole day or a precise instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawEventTime")]
pub enum EventTime {
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
}

#[derive(Deserialize)]
struct RawEventTime {
    #[serde(default, rename = "dateTime")]
    date_time: Option<DateTime<FixedOffset>>,
    #[serde(default)]
    date: Option<NaiveDate>,
}

impl TryFrom<RawEventTime> for EventTime {
    type Error = String;

    fn try_from(raw: RawEventTime) -> Result<Self, Self::Error> {
        match (raw.date_time, raw.date) {
            (Some(date_time), _) => Ok(EventTime::DateTime(date_time)),
            (None, Some(date)) => Ok(EventTime::Date(date)),
            (None, None) => Err("event time has neither dateTime nor date".to_string()),
        }
    }
}

impl Serialize for EventTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            EventTime::Date(date) => serializer.collect_str(date),
            EventTime::DateTime(date_time) => serializer.serialize_str(&date_time.to_rfc3339()),
        }
    }
}

impl EventTime {
    /// Civil date in the display timezone
    pub fn civil_date<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        match self {
            EventTime::Date(date) => *date,
            EventTime::DateTime(date_time) => date_time.with_timezone(tz).date_naive(),
        }
    }

    /// Instant used for ordering; whole days start at local midnight
    pub fn instant<Tz: TimeZone>(&self, tz: &Tz) -> DateTime<Utc> {
        match self {
            EventTime::Date(date) => local_midnight(*date, tz),
            EventTime::DateTime(date_time) => date_time.with_timezone(&Utc),
        }
    }

    pub fn is_midnight<Tz: TimeZone>(&self, tz: &Tz) -> bool {
        match self {
            EventTime::Date(_) => true,
            EventTime::DateTime(date_time) => date_time.with_timezone(tz).time() == NaiveTime::MIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl CalendarEvent {
    /// Last civil day the event occupies. An end exactly at midnight belongs
    /// to the day before, which is how feeds encode whole-day events.
    pub fn last_day<Tz: TimeZone>(&self, tz: &Tz) -> NaiveDate {
        let end = self.end.civil_date(tz);
        if self.end.is_midnight(tz) {
            end.pred_opt().unwrap_or(end)
        } else {
            end
        }
    }
}

/// Outcome of a service invocation, shaped by whether a response was requested
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceCallResult {
    ChangedStates(Vec<EntityState>),
    Response(Value),
}

/// Everything fetched from Home Assistant for one render. Ordered maps keep
/// the template output stable between renders of the same data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HomeAssistantData {
    pub entities: BTreeMap<String, EntityState>,
    pub calendars: BTreeMap<String, Vec<CalendarDay>>,
    pub services: BTreeMap<String, ServiceCallResult>,
}
