//! YAML configuration, loaded once at startup.
//!
//! ```yaml
//! mqtt:
//!   broker: 192.168.1.10
//!   username: cube
//!   password: secret
//!   topic: tasmota_cube
//! weather:
//!   lat: 52.37
//!   lon: 4.89
//!   api_key: "<openweathermap key>"
//! schedule:
//!   active_start_hour: 9
//!   active_end_hour: 22
//!   refresh_secs: 300
//! color:
//!   cold_kelvin: 273
//!   hot_kelvin: 308
//!   accents:
//!     Snow: "#FFFFFF"
//! status_page:
//!   enabled: true
//!   bind: "0.0.0.0:5000"
//! ```

use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::color::{ColorMapper, Condition, Rgb, DEFAULT_COLD_KELVIN, DEFAULT_HOT_KELVIN};
use crate::error::ConfigError;
use crate::schedule::{ActiveHours, DEFAULT_END_HOUR, DEFAULT_START_HOUR};
use crate::weather::DEFAULT_BASE_URL;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub weather: WeatherConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub color: ColorConfig,
    #[serde(default)]
    pub status_page: StatusPageConfig,
}

/// Broker connection and the display's Tasmota topic.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Device topic prefix; commands go to `{topic}/cmnd/...`.
    pub topic: String,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(rename = "lat", alias = "latitude")]
    pub latitude: f64,
    #[serde(rename = "lon", alias = "longitude")]
    pub longitude: f64,
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_start_hour")]
    pub active_start_hour: u32,
    #[serde(default = "default_end_hour")]
    pub active_end_hour: u32,
    /// Seconds between polling cycles.
    #[serde(default = "default_refresh")]
    pub refresh_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            active_start_hour: default_start_hour(),
            active_end_hour: default_end_hour(),
            refresh_secs: default_refresh(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorConfig {
    #[serde(default = "default_cold")]
    pub cold_kelvin: f64,
    #[serde(default = "default_hot")]
    pub hot_kelvin: f64,
    /// Per-condition accent overrides as `#RRGGBB`.
    #[serde(default)]
    pub accents: BTreeMap<Condition, String>,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            cold_kelvin: default_cold(),
            hot_kelvin: default_hot(),
            accents: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for StatusPageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: default_bind(),
        }
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "weather-cube".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_start_hour() -> u32 {
    DEFAULT_START_HOUR
}

fn default_end_hour() -> u32 {
    DEFAULT_END_HOUR
}

fn default_refresh() -> u64 {
    300
}

fn default_cold() -> f64 {
    DEFAULT_COLD_KELVIN
}

fn default_hot() -> f64 {
    DEFAULT_HOT_KELVIN
}

fn default_true() -> bool {
    true
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

impl Config {
    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.broker.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.broker is empty".to_string()));
        }
        if self.mqtt.topic.trim().is_empty() {
            return Err(ConfigError::Invalid("mqtt.topic is empty".to_string()));
        }
        if self.mqtt.topic.contains(['#', '+']) {
            return Err(ConfigError::Invalid(format!(
                "mqtt.topic must not contain wildcards: {}",
                self.mqtt.topic
            )));
        }
        if self.weather.api_key.trim().is_empty() {
            return Err(ConfigError::Invalid("weather.api_key is empty".to_string()));
        }
        if !(-90.0..=90.0).contains(&self.weather.latitude) {
            return Err(ConfigError::Invalid(format!(
                "weather.lat out of range: {}",
                self.weather.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.weather.longitude) {
            return Err(ConfigError::Invalid(format!(
                "weather.lon out of range: {}",
                self.weather.longitude
            )));
        }
        if self.schedule.refresh_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.refresh_secs must be positive".to_string(),
            ));
        }
        if self.status_page.enabled {
            self.status_bind_addr()?;
        }
        self.active_hours()?;
        self.color_mapper()?;
        Ok(())
    }

    pub fn active_hours(&self) -> Result<ActiveHours, ConfigError> {
        ActiveHours::new(
            self.schedule.active_start_hour,
            self.schedule.active_end_hour,
        )
    }

    /// Color mapper with thresholds and accent overrides applied.
    pub fn color_mapper(&self) -> Result<ColorMapper, ConfigError> {
        let mut mapper = ColorMapper::new(self.color.cold_kelvin, self.color.hot_kelvin)?;
        for (condition, hex) in &self.color.accents {
            let color: Rgb = hex.parse().map_err(|e| {
                ConfigError::Invalid(format!("color.accents.{}: {}", condition.label(), e))
            })?;
            mapper = mapper.with_accent(*condition, color);
        }
        Ok(mapper)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.refresh_secs)
    }

    pub fn status_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.status_page.bind.parse().map_err(|e| {
            ConfigError::Invalid(format!(
                "status_page.bind '{}': {}",
                self.status_page.bind, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
mqtt:
  broker: 192.168.1.10
  topic: tasmota_cube
weather:
  lat: 52.37
  lon: 4.89
  api_key: abc123
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_yaml(MINIMAL).unwrap();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_id, "weather-cube");
        assert!(config.mqtt.username.is_none());
        assert_eq!(config.weather.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.weather.timeout_secs, 10);
        assert_eq!(config.schedule.active_start_hour, 9);
        assert_eq!(config.schedule.active_end_hour, 22);
        assert_eq!(config.refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.color.cold_kelvin, 273.0);
        assert_eq!(config.color.hot_kelvin, 308.0);
        assert!(config.status_page.enabled);
        assert_eq!(config.status_bind_addr().unwrap().port(), 5000);
    }

    #[test]
    fn test_full_config() {
        let yaml = r##"
mqtt:
  broker: mqtt.local
  port: 8883
  client_id: cube-1
  username: cube
  password: secret
  topic: tasmota_cube
weather:
  latitude: -33.86
  longitude: 151.2
  api_key: abc123
  timeout_secs: 3
schedule:
  active_start_hour: 7
  active_end_hour: 21
  refresh_secs: 60
color:
  cold_kelvin: 265
  hot_kelvin: 308
  accents:
    Snow: "#FFFFFF"
status_page:
  enabled: false
  bind: "not an address"
"##;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.mqtt.username.as_deref(), Some("cube"));
        assert_eq!(config.weather.latitude, -33.86);
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));

        let hours = config.active_hours().unwrap();
        assert_eq!((hours.start_hour(), hours.end_hour()), (7, 21));

        let mapper = config.color_mapper().unwrap();
        assert_eq!(mapper.cold_kelvin(), 265.0);
        assert_eq!(
            mapper.condition_to_accent("Snow"),
            Some(Rgb::new(255, 255, 255))
        );
        assert_eq!(
            mapper.condition_to_accent("Rain"),
            Some(crate::color::DEFAULT_ACCENT)
        );
    }

    #[test]
    fn test_missing_required_section() {
        let yaml = "mqtt:\n  broker: a\n  topic: b\n";
        assert!(matches!(Config::from_yaml(yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_accent_condition_rejected() {
        let yaml = format!("{}color:\n  accents:\n    Mist: \"#FFFFFF\"\n", MINIMAL);
        assert!(matches!(Config::from_yaml(&yaml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            MINIMAL.replace("api_key: abc123", "api_key: \"\""),
            MINIMAL.replace("lat: 52.37", "lat: 123.0"),
            MINIMAL.replace("topic: tasmota_cube", "topic: cube/#"),
            format!("{}schedule:\n  refresh_secs: 0\n", MINIMAL),
            format!("{}schedule:\n  active_end_hour: 24\n", MINIMAL),
            format!("{}color:\n  cold_kelvin: 310\n", MINIMAL),
            format!("{}color:\n  accents:\n    Rain: blue\n", MINIMAL),
            format!("{}status_page:\n  bind: nowhere\n", MINIMAL),
        ];
        for yaml in &cases {
            assert!(
                matches!(Config::from_yaml(yaml), Err(ConfigError::Invalid(_))),
                "accepted:\n{}",
                yaml
            );
        }
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, MINIMAL).unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.mqtt.topic, "tasmota_cube");
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::from_yaml(include_str!("../config.example.yaml")).unwrap();
        assert_eq!(config.mqtt.topic, "tasmota_cube");
        assert_eq!(config.status_bind_addr().unwrap().port(), 5000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/weather-cube.yaml");
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }
}
