use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{InputError, PartialDegradation};

/// Display unit of a forecast temperature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "F")]
    Fahrenheit,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    /// Parse a weather.gov `temperatureUnit` (`"F"`/`"C"`) or WMO unit code (`"wmoUnit:degC"`).
    pub fn from_code(code: &str) -> Option<Self> {
        let lowered = code.trim().to_ascii_lowercase();
        if lowered == "f" || lowered.ends_with("degf") {
            Some(Self::Fahrenheit)
        } else if lowered == "c" || lowered.ends_with("degc") {
            Some(Self::Celsius)
        } else {
            None
        }
    }
}

/// A validated coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Result<Self, InputError> {
        if !lat.is_finite() || !lon.is_finite() {
            return Err(InputError::Malformed(format!("{}, {}", lat, lon)));
        }
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(InputError::OutOfRange { lat, lon });
        }
        Ok(Self { lat, lon })
    }

    /// Parse caller-supplied text such as query parameters.
    pub fn parse(lat: &str, lon: &str) -> Result<Self, InputError> {
        let parse = |value: &str| {
            value
                .trim()
                .parse::<f64>()
                .map_err(|_| InputError::Malformed(value.trim().to_string()))
        };
        Self::new(parse(lat)?, parse(lon)?)
    }

    /// `"lat,lon"` as weather.gov expects it in paths and query strings.
    pub fn to_query(&self) -> String {
        format!("{:.4},{:.4}", self.lat, self.lon)
    }
}

/// Options for `ForecastService::resolve_forecast`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForecastOptions {
    pub include_hourly: bool,
    pub include_alerts: bool,
    pub include_observations: bool,
    /// Canonical key from a prior geocode step
    pub preferred_key: Option<String>,
    pub preferred_city: Option<String>,
    pub preferred_state: Option<String>,
}

impl Default for ForecastOptions {
    fn default() -> Self {
        Self {
            include_hourly: true,
            include_alerts: true,
            include_observations: true,
            preferred_key: None,
            preferred_city: None,
            preferred_state: None,
        }
    }
}

impl ForecastOptions {
    /// Carry the city/state hint of a geocoding result into the forecast lookup.
    pub fn from_geocode(result: &GeocodeResult) -> Self {
        Self {
            preferred_key: result.canonical_key(),
            preferred_city: result.city.clone(),
            preferred_state: result.state.clone(),
            ..Self::default()
        }
    }
}

/// Result of `ForecastService::resolve_address`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodeResult {
    pub lat: f64,
    pub lon: f64,
    pub city: Option<String>,
    pub state: Option<String>,
    pub display_name: Option<String>,
}

impl GeocodeResult {
    pub fn canonical_key(&self) -> Option<String> {
        match (&self.city, &self.state) {
            (Some(city), Some(state)) => crate::cache::location_key(city, state),
            _ => None,
        }
    }
}

/// A forecast period as shown to the caller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub is_daytime: bool,
    pub temperature: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub wind_speed: Option<String>,
    pub wind_direction: Option<String>,
    pub short_forecast: Option<String>,
    pub detailed_forecast: Option<String>,
    pub icon: Option<String>,
}

/// Hourly forecast entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyEntry {
    pub time_label: String,
    pub start_time: DateTime<FixedOffset>,
    pub temperature: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub felt_temperature: Option<i32>,
    pub precip_chance: Option<u8>,
    pub short_forecast: Option<String>,
}

/// Daily summary built from day/night periods
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    /// ISO date, e.g. `2024-07-01`
    pub key: String,
    pub date_label: String,
    pub name: String,
    pub short_forecast: Option<String>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub temperature_unit: TemperatureUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourDetail {
    pub time_label: String,
    pub hour: u32,
    pub temperature: Option<f64>,
    pub temperature_unit: TemperatureUnit,
    pub felt_temperature: Option<i32>,
    pub precip_chance: Option<u8>,
    pub short_forecast: Option<String>,
}

/// Hour-level breakdown of one calendar day
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyDetail {
    pub key: String,
    pub date_label: String,
    pub hours: Vec<HourDetail>,
}

/// Where the current conditions came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionsSource {
    Forecast,
    Hourly,
    Station { station_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentConditions {
    pub temperature: Option<f64>,
    pub felt_temperature: Option<i32>,
    pub unit: TemperatureUnit,
    pub humidity: Option<u8>,
    pub precip_chance: Option<u8>,
    pub wind_mph: Option<f64>,
    pub description: Option<String>,
    pub source: ConditionsSource,
    pub observed_at: Option<DateTime<FixedOffset>>,
}

/// Normalized alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Minor,
    Moderate,
    Severe,
    Extreme,
}

impl Severity {
    /// Unknown or missing severities count as minor.
    pub fn from_raw(raw: Option<&str>) -> Self {
        match raw.map(|r| r.trim().to_ascii_lowercase()).as_deref() {
            Some("moderate") => Self::Moderate,
            Some("severe") => Self::Severe,
            Some("extreme") => Self::Extreme,
            _ => Self::Minor,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Moderate => "moderate",
            Self::Severe => "severe",
            Self::Extreme => "extreme",
        }
    }
}

/// Serialized as a CSS `rgb(...)` string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `"rgb(185, 28, 28)"`
    pub fn css(&self) -> String {
        format!("rgb({}, {}, {})", self.r, self.g, self.b)
    }

    /// Relative luminance in `0.0..=1.0`
    pub fn luminance(&self) -> f64 {
        (0.2126 * f64::from(self.r) + 0.7152 * f64::from(self.g) + 0.0722 * f64::from(self.b)) / 255.0
    }
}

/// Text color readable on top of an area color, serialized as a CSS hex color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextColor {
    Dark,
    Light,
}

impl TextColor {
    pub fn css(&self) -> &'static str {
        match self {
            Self::Dark => "#1a1a1a",
            Self::Light => "#ffffff",
        }
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.css())
    }
}

impl Serialize for TextColor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.css())
    }
}

/// One affected area of an alert, ordered by distance from the requested point
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertArea {
    pub name: String,
    pub distance_miles: Option<f64>,
    pub color: Rgb,
    pub text_color: TextColor,
    pub is_closest: bool,
    pub zone_id: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertRecord {
    pub id: Option<String>,
    pub event: Option<String>,
    pub title: Option<String>,
    pub sentence: String,
    pub severity: Option<String>,
    pub severity_slug: Severity,
    pub area_description: Option<String>,
    pub areas: Vec<AlertArea>,
    pub issuer: Option<String>,
    pub sent: Option<String>,
    pub start_iso: Option<String>,
    pub end_iso: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub hazard: Option<String>,
    pub impacts: Option<String>,
    pub instruction: Option<String>,
}

/// Unified forecast for one location
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastRecord {
    pub location: String,
    pub location_key: String,
    pub time_zone: Option<String>,
    pub period: PeriodSummary,
    pub next_period: Option<PeriodSummary>,
    pub current: CurrentConditions,
    pub hourly: Vec<HourlyEntry>,
    pub daily: Vec<DailySummary>,
    pub daily_details: Vec<DailyDetail>,
    pub alerts: Vec<AlertRecord>,
    pub hourly_error: Option<PartialDegradation>,
    pub alerts_error: Option<PartialDegradation>,
    pub data_as_of: Option<String>,
    pub updated_at: String,
}
