// Home Assistant REST API implementation of the repository port
use crate::application::home_assistant_repository::HomeAssistantRepository;
use crate::domain::home_assistant::{CalendarEvent, EntityState, ServiceCallResult};
use crate::infrastructure::config::HomeAssistantSettings;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum HomeAssistantError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered {status}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("failed to decode response of {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("home assistant is not configured")]
    NotConfigured,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    message: String,
}

#[derive(Debug, Clone)]
pub struct HomeAssistantClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HomeAssistantClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
        })
    }

    pub fn from_settings(settings: &HomeAssistantSettings) -> Result<Self> {
        Self::new(
            settings.base_url(),
            settings.token.clone(),
            Duration::from_secs(settings.timeout_secs),
        )
    }

    /// Message of `GET /api/`, used as a connectivity check
    pub async fn test_connection(&self) -> Result<String> {
        let status: ApiStatus = self.send(self.client.get(self.url("/api/")), "/api/").await?;
        Ok(status.message)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        path: &str,
    ) -> Result<T, HomeAssistantError> {
        let url = self.url(path);
        let response = request
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| HomeAssistantError::Request {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(HomeAssistantError::Status { url, status, body });
        }

        response
            .json::<T>()
            .await
            .map_err(|source| HomeAssistantError::Decode { url, source })
    }
}

#[async_trait]
impl HomeAssistantRepository for HomeAssistantClient {
    async fn get_state(&self, entity_id: &str) -> Result<EntityState> {
        let path = format!("/api/states/{}", urlencoding::encode(entity_id));
        Ok(self.send(self.client.get(self.url(&path)), &path).await?)
    }

    async fn get_calendar(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        let path = format!("/api/calendars/{}", urlencoding::encode(calendar_id));
        let request = self.client.get(self.url(&path)).query(&[
            ("start", start.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("end", end.to_rfc3339_opts(SecondsFormat::Secs, true)),
        ]);
        Ok(self.send(request, &path).await?)
    }

    async fn call_service(
        &self,
        domain: &str,
        service: &str,
        data: &Value,
        return_response: bool,
    ) -> Result<ServiceCallResult> {
        let mut path = format!(
            "/api/services/{}/{}",
            urlencoding::encode(domain),
            urlencoding::encode(service)
        );
        if return_response {
            path.push_str("?return_response");
        }

        let empty = Value::Object(Default::default());
        let body = if data.is_null() { &empty } else { data };
        let request = self.client.post(self.url(&path)).json(body);
        if return_response {
            Ok(ServiceCallResult::Response(self.send(request, &path).await?))
        } else {
            Ok(ServiceCallResult::ChangedStates(self.send(request, &path).await?))
        }
    }
}

/// Backend used when no Home Assistant is configured: every item is unavailable
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredHomeAssistant;

#[async_trait]
impl HomeAssistantRepository for UnconfiguredHomeAssistant {
    async fn get_state(&self, _entity_id: &str) -> Result<EntityState> {
        Err(HomeAssistantError::NotConfigured.into())
    }

    async fn get_calendar(
        &self,
        _calendar_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>> {
        Err(HomeAssistantError::NotConfigured.into())
    }

    async fn call_service(
        &self,
        _domain: &str,
        _service: &str,
        _data: &Value,
        _return_response: bool,
    ) -> Result<ServiceCallResult> {
        Err(HomeAssistantError::NotConfigured.into())
    }
}
