//! Weather → color mapping.
//!
//! The primary color comes from the temperature: a hue sweep from blue
//! (cold) to red (hot) at full saturation and value. Notable sky conditions
//! add a second, fixed accent color.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::weather::WeatherReading;

/// Hue used at and below the cold threshold.
pub const COLD_HUE: f64 = 0.6;
/// Hue used at and above the hot threshold.
pub const HOT_HUE: f64 = 0.0;

pub const DEFAULT_COLD_KELVIN: f64 = 273.0;
pub const DEFAULT_HOT_KELVIN: f64 = 308.0;

/// Accent shown for every notable condition unless overridden.
pub const DEFAULT_ACCENT: Rgb = Rgb::new(0xFF, 0x00, 0x99);

/// An 8-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert a hue in [0, 1) at full saturation and value.
    pub fn from_hue(hue: f64) -> Self {
        let h = hue.rem_euclid(1.0) * 6.0;
        let sector = h.floor();
        let f = h - sector;
        let (r, g, b) = match sector as u8 % 6 {
            0 => (1.0, f, 0.0),
            1 => (1.0 - f, 1.0, 0.0),
            2 => (0.0, 1.0, f),
            3 => (0.0, 1.0 - f, 1.0),
            4 => (f, 0.0, 1.0),
            _ => (1.0, 0.0, 1.0 - f),
        };
        Self::new(channel(r), channel(g), channel(b))
    }

    /// `#RRGGBB`, uppercase.
    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

fn channel(c: f64) -> u8 {
    (c * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Renders as `R,G,B`, the form the display expects in a palette.
impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Parse `#RRGGBB` (the leading `#` is optional).
    fn from_str(s: &str) -> Result<Self, String> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("expected #RRGGBB, got '{}'", s));
        }
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
        Ok(Self::new(byte(0)?, byte(2)?, byte(4)?))
    }
}

/// Sky conditions that earn an accent color.
///
/// Labels match the provider's `weather[].main` spelling exactly. Anything
/// else ("Clear", "Clouds", "Mist", ...) has no accent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Condition {
    Thunderstorm,
    Drizzle,
    Rain,
    Snow,
    Smoke,
    Haze,
    Dust,
    Sand,
    Ash,
    Squall,
    Tornado,
}

impl Condition {
    pub const ALL: [Condition; 11] = [
        Condition::Thunderstorm,
        Condition::Drizzle,
        Condition::Rain,
        Condition::Snow,
        Condition::Smoke,
        Condition::Haze,
        Condition::Dust,
        Condition::Sand,
        Condition::Ash,
        Condition::Squall,
        Condition::Tornado,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Condition::Thunderstorm => "Thunderstorm",
            Condition::Drizzle => "Drizzle",
            Condition::Rain => "Rain",
            Condition::Snow => "Snow",
            Condition::Smoke => "Smoke",
            Condition::Haze => "Haze",
            Condition::Dust => "Dust",
            Condition::Sand => "Sand",
            Condition::Ash => "Ash",
            Condition::Squall => "Squall",
            Condition::Tornado => "Tornado",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label)
    }
}

/// Colors to show on the display: the temperature color, optionally
/// followed by a condition accent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorCommand {
    pub primary: Rgb,
    pub accent: Option<Rgb>,
}

impl ColorCommand {
    /// Colors in display order, primary first.
    pub fn colors(&self) -> Vec<Rgb> {
        std::iter::once(self.primary).chain(self.accent).collect()
    }
}

/// Maps weather readings to display colors.
#[derive(Debug, Clone)]
pub struct ColorMapper {
    cold_kelvin: f64,
    hot_kelvin: f64,
    accents: BTreeMap<Condition, Rgb>,
}

impl Default for ColorMapper {
    fn default() -> Self {
        Self {
            cold_kelvin: DEFAULT_COLD_KELVIN,
            hot_kelvin: DEFAULT_HOT_KELVIN,
            accents: default_accents(),
        }
    }
}

fn default_accents() -> BTreeMap<Condition, Rgb> {
    Condition::ALL
        .into_iter()
        .map(|c| (c, DEFAULT_ACCENT))
        .collect()
}

impl ColorMapper {
    /// Create a mapper with the given thresholds and the default accents.
    pub fn new(cold_kelvin: f64, hot_kelvin: f64) -> Result<Self, ConfigError> {
        if !cold_kelvin.is_finite() || !hot_kelvin.is_finite() {
            return Err(ConfigError::Invalid(
                "color thresholds must be finite".to_string(),
            ));
        }
        if cold_kelvin >= hot_kelvin {
            return Err(ConfigError::Invalid(format!(
                "cold_kelvin ({}) must be below hot_kelvin ({})",
                cold_kelvin, hot_kelvin
            )));
        }
        Ok(Self {
            cold_kelvin,
            hot_kelvin,
            accents: default_accents(),
        })
    }

    /// Replace the accent for one condition.
    pub fn with_accent(mut self, condition: Condition, color: Rgb) -> Self {
        self.accents.insert(condition, color);
        self
    }

    pub fn cold_kelvin(&self) -> f64 {
        self.cold_kelvin
    }

    pub fn hot_kelvin(&self) -> f64 {
        self.hot_kelvin
    }

    /// Hue for a temperature: 0.6 at or below cold, 0.0 at or above hot,
    /// linear in between.
    pub fn temperature_to_hue(&self, temp_kelvin: f64) -> f64 {
        if temp_kelvin <= self.cold_kelvin {
            COLD_HUE
        } else if temp_kelvin >= self.hot_kelvin {
            HOT_HUE
        } else {
            let ratio = (temp_kelvin - self.cold_kelvin) / (self.hot_kelvin - self.cold_kelvin);
            (COLD_HUE - ratio * COLD_HUE).clamp(HOT_HUE, COLD_HUE)
        }
    }

    pub fn temperature_to_color(&self, temp_kelvin: f64) -> Rgb {
        Rgb::from_hue(self.temperature_to_hue(temp_kelvin))
    }

    /// Accent for a condition label, or `None` when the condition is not
    /// notable.
    pub fn condition_to_accent(&self, label: &str) -> Option<Rgb> {
        Condition::from_label(label).and_then(|c| self.accents.get(&c).copied())
    }

    pub fn build_color_command(&self, reading: &WeatherReading) -> ColorCommand {
        ColorCommand {
            primary: self.temperature_to_color(reading.temperature_kelvin),
            accent: self.condition_to_accent(&reading.condition),
        }
    }
}
