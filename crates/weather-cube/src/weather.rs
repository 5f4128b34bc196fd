//! Current-weather source backed by the OpenWeatherMap HTTP API.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::WeatherConfig;
use crate::error::FetchError;

/// Default OpenWeatherMap current-weather endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

const KELVIN_OFFSET: f64 = 273.15;

/// One observation, valid for a single polling cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherReading {
    pub temperature_kelvin: f64,
    /// Provider condition label, e.g. "Rain" or "Clear".
    pub condition: String,
}

impl WeatherReading {
    pub fn temperature_celsius(&self) -> f64 {
        self.temperature_kelvin - KELVIN_OFFSET
    }
}

/// Anything that can produce the current weather.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current(&self) -> Result<WeatherReading, FetchError>;
}

// Only the fields we need; everything else in the payload is ignored.
#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
}

/// Parse a current-weather JSON body.
///
/// Requires `main.temp` and `weather[0].main`; any other shape is a
/// [`FetchError::Malformed`].
pub fn parse_reading(body: &str) -> Result<WeatherReading, FetchError> {
    let response: CurrentWeatherResponse =
        serde_json::from_str(body).map_err(|e| FetchError::Malformed(e.to_string()))?;

    let condition = response
        .weather
        .into_iter()
        .next()
        .map(|w| w.main)
        .ok_or_else(|| FetchError::Malformed("empty 'weather' array".to_string()))?;

    Ok(WeatherReading {
        temperature_kelvin: response.main.temp,
        condition,
    })
}

/// OpenWeatherMap client for a fixed location.
#[derive(Debug)]
pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    latitude: f64,
    longitude: f64,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(config: &WeatherConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            latitude: config.latitude,
            longitude: config.longitude,
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current(&self) -> Result<WeatherReading, FetchError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("lat", self.latitude.to_string()),
                ("lon", self.longitude.to_string()),
                ("appid", self.api_key.clone()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        log::debug!("[Weather] response: {}", body);
        parse_reading(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "coord": {"lon": -122.08, "lat": 37.39},
        "weather": [
            {"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"},
            {"id": 701, "main": "Mist", "description": "mist", "icon": "50d"}
        ],
        "base": "stations",
        "main": {"temp": 282.55, "feels_like": 281.86, "pressure": 1023, "humidity": 100},
        "name": "Mountain View",
        "cod": 200
    }"#;

    #[test]
    fn test_parse_sample_response() {
        let reading = parse_reading(SAMPLE).unwrap();
        assert_eq!(reading.condition, "Rain");
        assert!((reading.temperature_kelvin - 282.55).abs() < 1e-9);
        assert!((reading.temperature_celsius() - 9.4).abs() < 1e-9);
    }

    #[test]
    fn test_parse_integer_temperature() {
        let reading = parse_reading(r#"{"main":{"temp":300},"weather":[{"main":"Clear"}]}"#)
            .unwrap();
        assert_eq!(reading.temperature_kelvin, 300.0);
    }

    #[test]
    fn test_parse_missing_temperature() {
        let result = parse_reading(r#"{"main":{},"weather":[{"main":"Clear"}]}"#);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_missing_main_block() {
        let result = parse_reading(r#"{"weather":[{"main":"Clear"}]}"#);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_empty_conditions() {
        let result = parse_reading(r#"{"main":{"temp":280.0},"weather":[]}"#);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
        let result = parse_reading(r#"{"main":{"temp":280.0}}"#);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_error_payload() {
        let result = parse_reading(r#"{"cod":401,"message":"Invalid API key"}"#);
        assert!(matches!(result, Err(FetchError::Malformed(_))));
    }

    #[test]
    fn test_parse_not_json() {
        assert!(matches!(
            parse_reading("<html>bad gateway</html>"),
            Err(FetchError::Malformed(_))
        ));
    }
}
