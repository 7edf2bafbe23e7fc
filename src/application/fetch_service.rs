// Fetch service - Gathers live Home Assistant data for one dashboard
use crate::application::home_assistant_repository::HomeAssistantRepository;
use crate::domain::calendar::{fill_calendar_days, local_midnight, window_start, CalendarDay, CalendarSpec};
use crate::domain::dashboard::{EntityConfig, HomeAssistantRequirements, ServiceConfig};
use crate::domain::home_assistant::{CalendarEvent, EntityState, HomeAssistantData, ServiceCallResult};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Runs the entity, calendar and service passes concurrently. A failing item
/// is logged and left out; it never fails the whole fetch. Dropping the
/// returned future abandons every request still in flight.
#[derive(Clone)]
pub struct DataFetchService {
    repository: Arc<dyn HomeAssistantRepository>,
}

impl DataFetchService {
    pub fn new(repository: Arc<dyn HomeAssistantRepository>) -> Self {
        Self { repository }
    }

    pub async fn fetch(
        &self,
        requirements: &HomeAssistantRequirements,
        now: &DateTime<Tz>,
    ) -> HomeAssistantData {
        if requirements.is_empty() {
            return HomeAssistantData::default();
        }

        let (entities, calendars, services) = tokio::join!(
            self.fetch_entities(&requirements.entities),
            self.fetch_calendars(&requirements.calendars, now),
            self.fetch_services(&requirements.services),
        );

        HomeAssistantData {
            entities,
            calendars,
            services,
        }
    }

    async fn fetch_entities(&self, entities: &[EntityConfig]) -> BTreeMap<String, EntityState> {
        let results = join_all(entities.iter().map(|entity| async move {
            (entity, self.repository.get_state(&entity.id).await)
        }))
        .await;

        let mut states = BTreeMap::new();
        for (entity, result) in results {
            match result {
                Ok(state) => {
                    states.insert(entity.name.clone(), state);
                }
                Err(e) => {
                    tracing::warn!(
                        entity = %entity.name,
                        entity_id = %entity.id,
                        err = %format!("{e:#}"),
                        "failed to get entity state"
                    );
                }
            }
        }

        states
    }

    async fn fetch_calendars(
        &self,
        calendars: &[CalendarSpec],
        now: &DateTime<Tz>,
    ) -> BTreeMap<String, Vec<CalendarDay>> {
        let start = local_midnight(window_start(now.date_naive()), &now.timezone());

        join_all(calendars.iter().map(|calendar| async move {
            let end = start + Duration::days(i64::from(calendar.days));
            let events = self.fetch_calendar_events(calendar, start, end).await;
            tracing::debug!(
                calendar = %calendar.name,
                events = events.len(),
                "fetched calendar events"
            );
            (calendar.name.clone(), fill_calendar_days(calendar, events, now))
        }))
        .await
        .into_iter()
        .collect()
    }

    /// Events of every source id, in source order, titles prefixed per id
    async fn fetch_calendar_events(
        &self,
        calendar: &CalendarSpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<CalendarEvent> {
        let results = join_all(calendar.ids.iter().map(|source| async move {
            (source, self.repository.get_calendar(&source.id, start, end).await)
        }))
        .await;

        let mut events = Vec::new();
        for (source, result) in results {
            match result {
                Ok(fetched) => {
                    events.extend(fetched.into_iter().map(|mut event| {
                        if let Some(prefix) = &source.prefix {
                            event.summary = format!("{}{}", prefix, event.summary);
                        }
                        event
                    }));
                }
                Err(e) => {
                    tracing::warn!(
                        calendar = %calendar.name,
                        entity_id = %source.id,
                        err = %format!("{e:#}"),
                        "failed to get calendar"
                    );
                }
            }
        }

        events
    }

    async fn fetch_services(
        &self,
        services: &[ServiceConfig],
    ) -> BTreeMap<String, ServiceCallResult> {
        let results = join_all(services.iter().map(|service| async move {
            let result = self
                .repository
                .call_service(
                    &service.domain,
                    &service.service,
                    &service.data,
                    service.return_response,
                )
                .await;
            (service, result)
        }))
        .await;

        let mut responses = BTreeMap::new();
        for (service, result) in results {
            match result {
                Ok(response) => {
                    responses.insert(service.name.clone(), response);
                }
                Err(e) => {
                    tracing::warn!(
                        domain = %service.domain,
                        service = %service.service,
                        err = %format!("{e:#}"),
                        "failed to call service"
                    );
                }
            }
        }

        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::FakeHomeAssistant;
    use crate::domain::calendar::{CalendarSource, GRID_DAYS};
    use crate::domain::home_assistant::EventTime;
    use chrono::TimeZone;

    fn now() -> DateTime<Tz> {
        chrono_tz::Europe::Berlin
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .unwrap()
    }

    fn entities(ids: &[&str]) -> Vec<EntityConfig> {
        ids.iter()
            .map(|id| EntityConfig {
                name: id.replace("sensor.", ""),
                id: id.to_string(),
            })
            .collect()
    }

    fn meeting(summary: &str, start: &str, end: &str) -> CalendarEvent {
        CalendarEvent {
            summary: summary.to_string(),
            start: EventTime::DateTime(DateTime::parse_from_rfc3339(start).unwrap()),
            end: EventTime::DateTime(DateTime::parse_from_rfc3339(end).unwrap()),
            description: None,
            location: None,
        }
    }

    fn calendar(name: &str, ids: Vec<CalendarSource>) -> CalendarSpec {
        CalendarSpec {
            name: name.to_string(),
            ids,
            days: 14,
            max_events: 0,
            skip_past_events: false,
        }
    }

    #[tokio::test]
    async fn test_failing_entity_is_absent() {
        let fake = FakeHomeAssistant::default()
            .with_state("sensor.a", "1")
            .with_state("sensor.b", "2")
            .with_state("sensor.c", "3")
            .with_state("sensor.d", "4")
            .with_state("sensor.e", "5")
            .failing("sensor.c");
        let service = DataFetchService::new(Arc::new(fake));
        let requirements = HomeAssistantRequirements {
            entities: entities(&["sensor.a", "sensor.b", "sensor.c", "sensor.d", "sensor.e"]),
            ..Default::default()
        };

        let data = service.fetch(&requirements, &now()).await;

        assert_eq!(data.entities.len(), 4);
        assert!(!data.entities.contains_key("c"));
        assert_eq!(data.entities["e"].state, "5");
    }

    #[tokio::test]
    async fn test_calendars_merge_sources_with_prefix() {
        let fake = FakeHomeAssistant::default()
            .with_calendar(
                "calendar.home",
                vec![meeting("Dinner", "2024-05-01T18:00:00+02:00", "2024-05-01T20:00:00+02:00")],
            )
            .with_calendar(
                "calendar.work",
                vec![meeting("Standup", "2024-05-01T09:30:00+02:00", "2024-05-01T09:45:00+02:00")],
            );
        let service = DataFetchService::new(Arc::new(fake));
        let requirements = HomeAssistantRequirements {
            calendars: vec![calendar(
                "family",
                vec![
                    CalendarSource {
                        id: "calendar.home".to_string(),
                        prefix: None,
                    },
                    CalendarSource {
                        id: "calendar.work".to_string(),
                        prefix: Some("Work: ".to_string()),
                    },
                ],
            )],
            ..Default::default()
        };

        let data = service.fetch(&requirements, &now()).await;

        let days = &data.calendars["family"];
        assert_eq!(days.len(), GRID_DAYS);
        let today: Vec<&str> = days[2].events.iter().map(|e| e.summary.as_str()).collect();
        assert_eq!(today, vec!["Work: Standup", "Dinner"]);
    }

    #[tokio::test]
    async fn test_calendar_window_starts_on_local_monday() {
        let fake = Arc::new(FakeHomeAssistant::default());
        let service = DataFetchService::new(fake.clone());
        let requirements = HomeAssistantRequirements {
            calendars: vec![calendar(
                "family",
                vec![CalendarSource {
                    id: "calendar.home".to_string(),
                    prefix: None,
                }],
            )],
            ..Default::default()
        };

        service.fetch(&requirements, &now()).await;

        let requests = fake.calendar_requests.lock().unwrap();
        let (id, start, end) = &requests[0];
        assert_eq!(id, "calendar.home");
        // Monday 2024-04-29 00:00 in Berlin (UTC+2)
        assert_eq!(*start, Utc.with_ymd_and_hms(2024, 4, 28, 22, 0, 0).unwrap());
        assert_eq!(*end - *start, Duration::days(14));
    }

    #[tokio::test]
    async fn test_failing_calendar_falls_back_to_empty_grid() {
        let fake = FakeHomeAssistant::default().failing("calendar.home");
        let service = DataFetchService::new(Arc::new(fake));
        let requirements = HomeAssistantRequirements {
            calendars: vec![calendar(
                "family",
                vec![CalendarSource {
                    id: "calendar.home".to_string(),
                    prefix: None,
                }],
            )],
            ..Default::default()
        };

        let data = service.fetch(&requirements, &now()).await;

        let days = &data.calendars["family"];
        assert_eq!(days.len(), GRID_DAYS);
        assert!(days.iter().all(|d| d.events.is_empty()));
    }

    #[tokio::test]
    async fn test_services_keep_successful_results() {
        let fake = FakeHomeAssistant::default()
            .with_service("weather", "get_forecasts", serde_json::json!({"temperature": 21}))
            .failing("script.turn_on");
        let service = DataFetchService::new(Arc::new(fake));
        let requirements = HomeAssistantRequirements {
            services: vec![
                ServiceConfig {
                    name: "forecast".to_string(),
                    domain: "weather".to_string(),
                    service: "get_forecasts".to_string(),
                    data: serde_json::json!({"entity_id": "weather.home"}),
                    return_response: true,
                },
                ServiceConfig {
                    name: "script".to_string(),
                    domain: "script".to_string(),
                    service: "turn_on".to_string(),
                    data: serde_json::Value::Null,
                    return_response: false,
                },
            ],
            ..Default::default()
        };

        let data = service.fetch(&requirements, &now()).await;

        assert_eq!(data.services.len(), 1);
        match &data.services["forecast"] {
            ServiceCallResult::Response(value) => {
                assert_eq!(value["response"]["temperature"], 21);
                assert_eq!(value["request"]["entity_id"], "weather.home");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
