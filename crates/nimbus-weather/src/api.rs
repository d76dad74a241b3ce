//! Upstream response shapes for weather.gov and Nominatim.
//!
//! Every optional field is modelled here once so the rest of the crate works with
//! plain `Option`s instead of probing JSON.

use serde::Deserialize;

/// `{ "value": 12.3, "unitCode": "wmoUnit:degC" }`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantitativeValue {
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PointsResponse {
    #[serde(default)]
    pub properties: PointsProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsProperties {
    pub forecast: Option<String>,
    pub forecast_hourly: Option<String>,
    pub observation_stations: Option<String>,
    pub time_zone: Option<String>,
    pub relative_location: Option<RelativeLocation>,
}

impl PointsProperties {
    pub fn city(&self) -> Option<&str> {
        self.relative_location
            .as_ref()
            .and_then(|r| r.properties.city.as_deref())
            .filter(|c| !c.trim().is_empty())
    }

    pub fn state(&self) -> Option<&str> {
        self.relative_location
            .as_ref()
            .and_then(|r| r.properties.state.as_deref())
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RelativeLocation {
    #[serde(default)]
    pub properties: RelativeLocationProperties,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelativeLocationProperties {
    pub city: Option<String>,
    pub state: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub properties: ForecastProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastProperties {
    pub update_time: Option<String>,
    pub generated_at: Option<String>,
    #[serde(default)]
    pub periods: Vec<ApiPeriod>,
}

/// Temperatures arrive as bare numbers or, with feature flags, as quantitative values.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TemperatureField {
    Number(f64),
    Quantity(QuantitativeValue),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPeriod {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub is_daytime: Option<bool>,
    #[serde(default)]
    pub temperature: Option<TemperatureField>,
    #[serde(default)]
    pub temperature_unit: Option<String>,
    #[serde(default)]
    pub probability_of_precipitation: Option<QuantitativeValue>,
    #[serde(default)]
    pub relative_humidity: Option<QuantitativeValue>,
    #[serde(default)]
    pub wind_speed: Option<String>,
    #[serde(default)]
    pub wind_direction: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub short_forecast: Option<String>,
    #[serde(default)]
    pub detailed_forecast: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AlertsResponse {
    #[serde(default)]
    pub features: Vec<AlertFeature>,
}

#[derive(Debug, Deserialize)]
pub struct AlertFeature {
    #[serde(default)]
    pub properties: AlertProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertProperties {
    pub id: Option<String>,
    pub area_desc: Option<String>,
    #[serde(default)]
    pub affected_zones: Vec<String>,
    pub sent: Option<String>,
    pub effective: Option<String>,
    pub onset: Option<String>,
    pub expires: Option<String>,
    pub ends: Option<String>,
    pub severity: Option<String>,
    pub event: Option<String>,
    pub sender_name: Option<String>,
    pub headline: Option<String>,
    pub description: Option<String>,
    pub instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StationsResponse {
    #[serde(default)]
    pub features: Vec<StationFeature>,
}

#[derive(Debug, Deserialize)]
pub struct StationFeature {
    #[serde(default)]
    pub properties: StationProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationProperties {
    pub station_identifier: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ObservationResponse {
    #[serde(default)]
    pub properties: ObservationProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationProperties {
    pub timestamp: Option<String>,
    pub text_description: Option<String>,
    pub temperature: Option<QuantitativeValue>,
    pub relative_humidity: Option<QuantitativeValue>,
    pub wind_speed: Option<QuantitativeValue>,
}

/// Alert zone feature: `/zones/{type}/{id}`
#[derive(Debug, Deserialize)]
pub struct ZoneResponse {
    #[serde(default)]
    pub properties: ZoneProperties,
    #[serde(default)]
    pub geometry: Option<RawGeometry>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ZoneProperties {
    pub id: Option<String>,
    pub name: Option<String>,
    pub state: Option<String>,
}

/// GeoJSON geometry before its coordinates are interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: serde_json::Value,
}

/// One Nominatim search hit.
#[derive(Debug, Clone, Deserialize)]
pub struct NominatimPlace {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub address: Option<NominatimAddress>,
}

impl NominatimPlace {
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let lat = self.lat.as_deref()?.trim().parse::<f64>().ok()?;
        let lon = self.lon.as_deref()?.trim().parse::<f64>().ok()?;
        Some((lat, lon))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominatimAddress {
    pub city: Option<String>,
    pub town: Option<String>,
    pub village: Option<String>,
    pub hamlet: Option<String>,
    pub municipality: Option<String>,
    pub state: Option<String>,
    pub state_code: Option<String>,
    #[serde(rename = "ISO3166-2-lvl4")]
    pub iso_subdivision: Option<String>,
}

impl NominatimAddress {
    pub fn city(&self) -> Option<String> {
        [&self.city, &self.town, &self.village, &self.hamlet, &self.municipality]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Two-letter state code when one is available, otherwise the state name.
    pub fn state(&self) -> Option<String> {
        let code = self
            .state_code
            .as_deref()
            .map(str::trim)
            .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()));
        if let Some(code) = code {
            return Some(code.to_uppercase());
        }

        let iso = self
            .iso_subdivision
            .as_deref()
            .map(str::trim)
            .and_then(|iso| iso.strip_prefix("US-"))
            .filter(|c| !c.is_empty());
        if let Some(code) = iso {
            return Some(code.to_uppercase());
        }

        self.state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}
