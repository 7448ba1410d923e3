//! Weather data sources invoked by the `getWeather` handler.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::TemperatureUnit;

pub const DEFAULT_WEATHER_BASE_URL: &str = "https://wttr.in";
pub const DEFAULT_WEATHER_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    pub location: String,
    pub unit: TemperatureUnit,
}

/// Current conditions reported by a provider, already in the requested unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentConditions {
    pub skytext: String,
    pub temperature: String,
    pub degree_type: TemperatureUnit,
}

#[derive(Debug, Error)]
pub enum WeatherProviderError {
    #[error("invalid weather provider configuration: {0}")]
    InvalidConfig(String),
    #[error("weather request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("weather provider returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid weather response: {0}")]
    InvalidResponse(String),
    #[error("no weather results for location '{0}'")]
    NoResults(String),
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
/// Trait contract for a current-conditions lookup.
pub trait WeatherProvider: Send + Sync {
    async fn current_conditions(
        &self,
        query: &WeatherQuery,
    ) -> Result<CurrentConditions, WeatherProviderError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpWeatherProviderConfig {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for HttpWeatherProviderConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            timeout_ms: DEFAULT_WEATHER_TIMEOUT_MS,
        }
    }
}

/// Provider backed by a wttr.in-compatible `?format=j1` JSON endpoint.
#[derive(Debug, Clone)]
pub struct HttpWeatherProvider {
    client: reqwest::Client,
    base_url: Url,
}

#[derive(Debug, Deserialize)]
struct WttrReport {
    #[serde(default)]
    current_condition: Vec<WttrCurrentCondition>,
}

#[derive(Debug, Deserialize)]
struct WttrCurrentCondition {
    #[serde(rename = "temp_F")]
    temp_f: String,
    #[serde(rename = "temp_C")]
    temp_c: String,
    #[serde(rename = "weatherDesc", default)]
    weather_desc: Vec<WttrText>,
}

#[derive(Debug, Deserialize)]
struct WttrText {
    value: String,
}

impl HttpWeatherProvider {
    pub fn new(config: HttpWeatherProviderConfig) -> Result<Self, WeatherProviderError> {
        if config.timeout_ms == 0 {
            return Err(WeatherProviderError::InvalidConfig(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }
        let base_url = Url::parse(config.base_url.trim()).map_err(|error| {
            WeatherProviderError::InvalidConfig(format!(
                "invalid base url '{}': {error}",
                config.base_url
            ))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(WeatherProviderError::InvalidConfig(format!(
                "base url '{}' cannot carry a path",
                config.base_url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, base_url })
    }

    fn conditions_url(&self, query: &WeatherQuery) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&query.location);
        }
        let unit_flag = match query.unit {
            TemperatureUnit::Fahrenheit => "u",
            TemperatureUnit::Celsius => "m",
        };
        url.set_query(Some(&format!("format=j1&{unit_flag}")));
        url
    }
}

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn current_conditions(
        &self,
        query: &WeatherQuery,
    ) -> Result<CurrentConditions, WeatherProviderError> {
        let url = self.conditions_url(query);
        tracing::debug!(%url, "requesting current weather conditions");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(WeatherProviderError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let report = serde_json::from_str::<WttrReport>(&body)
            .map_err(|error| WeatherProviderError::InvalidResponse(error.to_string()))?;
        let current = report
            .current_condition
            .into_iter()
            .next()
            .ok_or_else(|| WeatherProviderError::NoResults(query.location.clone()))?;
        let skytext = current
            .weather_desc
            .into_iter()
            .map(|text| text.value.trim().to_string())
            .find(|text| !text.is_empty())
            .ok_or_else(|| {
                WeatherProviderError::InvalidResponse(
                    "current condition has no weather description".to_string(),
                )
            })?;
        let temperature = match query.unit {
            TemperatureUnit::Fahrenheit => current.temp_f,
            TemperatureUnit::Celsius => current.temp_c,
        };
        Ok(CurrentConditions {
            skytext,
            temperature,
            degree_type: query.unit,
        })
    }
}
