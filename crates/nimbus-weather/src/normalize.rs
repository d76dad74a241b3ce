//! Turns raw forecast periods and station observations into display records.

use chrono::{DateTime, Duration, DurationRound, FixedOffset, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::api::{ApiPeriod, ObservationProperties, QuantitativeValue, TemperatureField};
use crate::format::{day_label, hour_label, parse_timestamp};
use crate::types::{
    ConditionsSource, CurrentConditions, DailyDetail, DailySummary, HourDetail, HourlyEntry,
    PeriodSummary, TemperatureUnit,
};

pub const HOURLY_LIMIT: usize = 24;
pub const DAILY_LIMIT: usize = 7;

const KM_PER_MILE: f64 = 1.609344;
const MPH_PER_METER_PER_SECOND: f64 = 2.236936;
const MPH_PER_KNOT: f64 = 1.150779;

pub fn to_fahrenheit(value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Fahrenheit => value,
        TemperatureUnit::Celsius => value * 9.0 / 5.0 + 32.0,
    }
}

pub fn from_fahrenheit(value: f64, unit: TemperatureUnit) -> f64 {
    match unit {
        TemperatureUnit::Fahrenheit => value,
        TemperatureUnit::Celsius => (value - 32.0) * 5.0 / 9.0,
    }
}

pub fn convert_temperature(value: f64, from: TemperatureUnit, to: TemperatureUnit) -> f64 {
    if from == to {
        value
    } else {
        from_fahrenheit(to_fahrenheit(value, from), to)
    }
}

/// Convert a wind speed to mph from its WMO unit code. Unknown units yield `None`.
pub fn wind_to_mph(value: f64, unit_code: &str) -> Option<f64> {
    let code = unit_code.trim().to_ascii_lowercase();
    if code.ends_with("km_h-1") || code.ends_with("km/h") {
        Some(value / KM_PER_MILE)
    } else if code.ends_with("m_s-1") || code.ends_with("m/s") {
        Some(value * MPH_PER_METER_PER_SECOND)
    } else if code.ends_with("kt") {
        Some(value * MPH_PER_KNOT)
    } else if code.ends_with("mi_h-1") || code.ends_with("mph") {
        Some(value)
    } else {
        None
    }
}

/// Average speed in mph from text such as `"10 to 15 mph"` or `"20 km/h"`.
pub fn parse_wind_mph(text: &str) -> Option<f64> {
    let numbers: Vec<f64> = text
        .split(|c: char| !(c.is_ascii_digit() || c == '.'))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse::<f64>().ok())
        .collect();
    if numbers.is_empty() {
        return None;
    }
    let average = numbers.iter().sum::<f64>() / numbers.len() as f64;
    if text.to_ascii_lowercase().contains("km/h") {
        Some(average / KM_PER_MILE)
    } else {
        Some(average)
    }
}

/// Felt temperature in °F before rounding.
///
/// Heat index (Rothfusz regression) at or above 80°F with humidity of at least 40%;
/// wind chill at or below 50°F with wind of at least 3 mph.
pub fn felt_fahrenheit(temp_f: f64, humidity: Option<f64>, wind_mph: Option<f64>) -> f64 {
    match (humidity, wind_mph) {
        (Some(rh), _) if temp_f >= 80.0 && rh >= 40.0 => {
            let t = temp_f;
            -42.379 + 2.04901523 * t + 10.14333127 * rh
                - 0.22475541 * t * rh
                - 0.00683783 * t * t
                - 0.05481717 * rh * rh
                + 0.00122874 * t * t * rh
                + 0.00085282 * t * rh * rh
                - 0.00000199 * t * t * rh * rh
        }
        (_, Some(v)) if temp_f <= 50.0 && v >= 3.0 => {
            let v16 = v.powf(0.16);
            35.74 + 0.6215 * temp_f - 35.75 * v16 + 0.4275 * temp_f * v16
        }
        _ => temp_f,
    }
}

/// Felt temperature rounded to a whole degree in `unit`.
pub fn felt_temperature(
    temp: f64,
    unit: TemperatureUnit,
    humidity: Option<f64>,
    wind_mph: Option<f64>,
) -> i32 {
    let felt = felt_fahrenheit(to_fahrenheit(temp, unit), humidity, wind_mph);
    from_fahrenheit(felt, unit).round() as i32
}

fn percent(value: Option<&QuantitativeValue>) -> Option<f64> {
    value.and_then(|q| q.value).filter(|v| v.is_finite())
}

fn whole_percent(value: Option<f64>) -> Option<u8> {
    value.map(|v| v.round().clamp(0.0, 100.0) as u8)
}

/// Temperature of a period in its display unit.
pub fn period_temperature(period: &ApiPeriod) -> (Option<f64>, TemperatureUnit) {
    let declared = period
        .temperature_unit
        .as_deref()
        .and_then(TemperatureUnit::from_code);
    match &period.temperature {
        Some(TemperatureField::Number(value)) => (Some(*value), declared.unwrap_or_default()),
        Some(TemperatureField::Quantity(q)) => {
            let source = q
                .unit_code
                .as_deref()
                .and_then(TemperatureUnit::from_code)
                .or(declared)
                .unwrap_or_default();
            let display = declared.unwrap_or(source);
            (q.value.map(|v| convert_temperature(v, source, display)), display)
        }
        None => (None, declared.unwrap_or_default()),
    }
}

fn period_felt(period: &ApiPeriod) -> Option<i32> {
    let (temp, unit) = period_temperature(period);
    let wind = period.wind_speed.as_deref().and_then(parse_wind_mph);
    temp.map(|t| felt_temperature(t, unit, percent(period.relative_humidity.as_ref()), wind))
}

pub fn summarize_period(period: &ApiPeriod) -> PeriodSummary {
    let (temperature, temperature_unit) = period_temperature(period);
    PeriodSummary {
        name: period.name.clone(),
        start_time: period.start_time.clone(),
        end_time: period.end_time.clone(),
        is_daytime: period.is_daytime.unwrap_or(true),
        temperature,
        temperature_unit,
        wind_speed: period.wind_speed.clone(),
        wind_direction: period.wind_direction.clone(),
        short_forecast: period.short_forecast.clone(),
        detailed_forecast: period.detailed_forecast.clone(),
        icon: period.icon.clone(),
    }
}

fn timed(periods: &[ApiPeriod]) -> impl Iterator<Item = (DateTime<FixedOffset>, &ApiPeriod)> {
    periods.iter().filter_map(|p| {
        let start = p.start_time.as_deref().and_then(parse_timestamp)?;
        Some((start, p))
    })
}

/// Today's date in the time zone of the first dated period.
fn local_today(periods: &[ApiPeriod], now: DateTime<Utc>) -> Option<NaiveDate> {
    timed(periods)
        .next()
        .map(|(start, _)| now.with_timezone(start.offset()).date_naive())
}

fn hourly_entry(start: DateTime<FixedOffset>, period: &ApiPeriod) -> HourlyEntry {
    let (temperature, temperature_unit) = period_temperature(period);
    HourlyEntry {
        time_label: hour_label(&start),
        start_time: start,
        temperature,
        temperature_unit,
        felt_temperature: period_felt(period),
        precip_chance: whole_percent(percent(period.probability_of_precipitation.as_ref())),
        short_forecast: period.short_forecast.clone(),
    }
}

/// Hourly periods from the start of the current hour, capped at `limit`. Falls back to
/// the first `limit` periods when none qualify.
pub fn build_hourly(periods: &[ApiPeriod], now: DateTime<Utc>, limit: usize) -> Vec<HourlyEntry> {
    let hour_start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
    let upcoming: Vec<HourlyEntry> = timed(periods)
        .filter(|(start, _)| *start >= hour_start)
        .take(limit)
        .map(|(start, p)| hourly_entry(start, p))
        .collect();
    if !upcoming.is_empty() {
        return upcoming;
    }
    timed(periods)
        .take(limit)
        .map(|(start, p)| hourly_entry(start, p))
        .collect()
}

#[derive(Debug)]
struct DayAccumulator {
    first_start: DateTime<FixedOffset>,
    name: Option<String>,
    name_from_daytime: bool,
    short_forecast: Option<String>,
    high: Option<f64>,
    low: Option<f64>,
    all_high: Option<f64>,
    all_low: Option<f64>,
    unit: Option<TemperatureUnit>,
}

fn fold_max(current: Option<f64>, value: f64) -> Option<f64> {
    Some(current.map_or(value, |c| c.max(value)))
}

fn fold_min(current: Option<f64>, value: f64) -> Option<f64> {
    Some(current.map_or(value, |c| c.min(value)))
}

/// Day summaries from 12-hour periods, grouped by local calendar date.
pub fn build_daily(periods: &[ApiPeriod], now: DateTime<Utc>, limit: usize) -> Vec<DailySummary> {
    let Some(today) = local_today(periods, now) else {
        return Vec::new();
    };
    let mut days: BTreeMap<NaiveDate, DayAccumulator> = BTreeMap::new();

    for (start, period) in timed(periods) {
        let date = start.date_naive();
        if date < today {
            continue;
        }
        let day = days.entry(date).or_insert_with(|| DayAccumulator {
            first_start: start,
            name: None,
            name_from_daytime: false,
            short_forecast: None,
            high: None,
            low: None,
            all_high: None,
            all_low: None,
            unit: None,
        });

        let (temp, unit) = period_temperature(period);
        let is_daytime = period.is_daytime.unwrap_or(true);
        if day.unit.is_none() && period.temperature.is_some() {
            day.unit = Some(unit);
        }
        if let Some(t) = temp {
            day.all_high = fold_max(day.all_high, t);
            day.all_low = fold_min(day.all_low, t);
            if is_daytime {
                day.high = fold_max(day.high, t);
            } else {
                day.low = fold_min(day.low, t);
            }
        }

        if is_daytime {
            if period.name.is_some() {
                day.name = period.name.clone();
                day.name_from_daytime = true;
            }
            if period.short_forecast.is_some() {
                day.short_forecast = period.short_forecast.clone();
            }
        } else {
            if !day.name_from_daytime && day.name.is_none() {
                day.name = period.name.clone();
            }
            if day.short_forecast.is_none() {
                day.short_forecast = period.short_forecast.clone();
            }
        }
    }

    days.into_iter()
        .take(limit)
        .map(|(date, day)| DailySummary {
            key: date.to_string(),
            date_label: day_label(&day.first_start),
            name: day
                .name
                .unwrap_or_else(|| day.first_start.format("%a").to_string()),
            short_forecast: day.short_forecast,
            high: day.high.or(day.all_high),
            low: day.low.or(day.all_low),
            temperature_unit: day.unit.unwrap_or_default(),
        })
        .collect()
}

/// Hour-level detail per local calendar date, from hourly periods.
pub fn build_daily_details(periods: &[ApiPeriod], now: DateTime<Utc>, limit: usize) -> Vec<DailyDetail> {
    let Some(today) = local_today(periods, now) else {
        return Vec::new();
    };
    let mut days: BTreeMap<NaiveDate, DailyDetail> = BTreeMap::new();

    for (start, period) in timed(periods) {
        let date = start.date_naive();
        if date < today {
            continue;
        }
        let (temperature, temperature_unit) = period_temperature(period);
        let detail = days.entry(date).or_insert_with(|| DailyDetail {
            key: date.to_string(),
            date_label: day_label(&start),
            hours: Vec::new(),
        });
        detail.hours.push(HourDetail {
            time_label: hour_label(&start),
            hour: chrono::Timelike::hour(&start),
            temperature,
            temperature_unit,
            felt_temperature: period_felt(period),
            precip_chance: whole_percent(percent(period.probability_of_precipitation.as_ref())),
            short_forecast: period.short_forecast.clone(),
        });
    }

    days.into_values().take(limit).collect()
}

/// Latest observation from one station.
#[derive(Debug)]
pub struct StationObservation {
    pub station_id: String,
    pub observed_at: DateTime<FixedOffset>,
    pub properties: ObservationProperties,
}

impl StationObservation {
    /// `None` when the observation carries no timestamp.
    pub fn new(station_id: impl Into<String>, properties: ObservationProperties) -> Option<Self> {
        let observed_at = properties.timestamp.as_deref().and_then(parse_timestamp)?;
        Some(Self {
            station_id: station_id.into(),
            observed_at,
            properties,
        })
    }

    fn has_temperature(&self) -> bool {
        self.properties
            .temperature
            .as_ref()
            .and_then(|t| t.value)
            .is_some()
    }

    /// Temperature converted to `unit`; observations default to °C.
    pub fn temperature(&self, unit: TemperatureUnit) -> Option<f64> {
        let quantity = self.properties.temperature.as_ref()?;
        let value = quantity.value?;
        let source = quantity
            .unit_code
            .as_deref()
            .and_then(TemperatureUnit::from_code)
            .unwrap_or(TemperatureUnit::Celsius);
        let converted = convert_temperature(value, source, unit);
        Some((converted * 10.0).round() / 10.0)
    }

    pub fn wind_mph(&self) -> Option<f64> {
        let quantity = self.properties.wind_speed.as_ref()?;
        let value = quantity.value?;
        wind_to_mph(value, quantity.unit_code.as_deref().unwrap_or("km_h-1"))
    }
}

/// Freshest usable observation: newer than the forecast update and no older than `max_age`.
pub fn select_observation(
    observations: Vec<StationObservation>,
    forecast_updated: Option<DateTime<FixedOffset>>,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Option<StationObservation> {
    observations
        .into_iter()
        .filter(StationObservation::has_temperature)
        .filter(|o| forecast_updated.map_or(true, |updated| o.observed_at > updated))
        .filter(|o| now.signed_duration_since(o.observed_at) <= max_age)
        .max_by_key(|o| o.observed_at)
}

/// Current conditions from the first forecast period, refined by the first hourly period
/// and then by a station observation.
pub fn current_conditions(
    period: &ApiPeriod,
    hourly: Option<&ApiPeriod>,
    observation: Option<&StationObservation>,
) -> CurrentConditions {
    let (mut temperature, mut unit) = period_temperature(period);
    let mut humidity = percent(period.relative_humidity.as_ref());
    let mut precip = percent(period.probability_of_precipitation.as_ref());
    let mut wind = period.wind_speed.as_deref().and_then(parse_wind_mph);
    let mut description = period.short_forecast.clone();
    let mut source = ConditionsSource::Forecast;
    let mut observed_at = None;

    if let Some(hour) = hourly {
        let (hour_temp, hour_unit) = period_temperature(hour);
        if hour_temp.is_some() {
            temperature = hour_temp;
            unit = hour_unit;
            source = ConditionsSource::Hourly;
        }
        humidity = percent(hour.relative_humidity.as_ref()).or(humidity);
        precip = percent(hour.probability_of_precipitation.as_ref()).or(precip);
        wind = hour.wind_speed.as_deref().and_then(parse_wind_mph).or(wind);
        description = hour.short_forecast.clone().or(description);
    }

    if let Some(obs) = observation {
        if let Some(t) = obs.temperature(unit) {
            temperature = Some(t);
            source = ConditionsSource::Station {
                station_id: obs.station_id.clone(),
            };
            observed_at = Some(obs.observed_at);
            humidity = percent(obs.properties.relative_humidity.as_ref()).or(humidity);
            wind = obs.wind_mph().or(wind);
            description = obs
                .properties
                .text_description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .or(description);
        }
    }

    CurrentConditions {
        temperature,
        felt_temperature: temperature.map(|t| felt_temperature(t, unit, humidity, wind)),
        unit,
        humidity: whole_percent(humidity),
        precip_chance: whole_percent(precip),
        wind_mph: wind.map(|w| (w * 10.0).round() / 10.0),
        description,
        source,
        observed_at,
    }
}
