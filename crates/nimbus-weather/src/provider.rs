//! `ForecastService`: the caller-facing entry point.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::sync::Arc;
use tracing::instrument;

use nimbus_core::Config;

use crate::alert;
use crate::api::{
    AlertsResponse, ApiPeriod, ForecastResponse, ObservationResponse, PointsProperties, PointsResponse,
    StationsResponse,
};
use crate::attribute::GeospatialAttributor;
use crate::cache::{
    address_alias, coordinate_alias, location_group, location_key, CacheStore, FileBackend,
    LocationSummary, POINTS_GROUP,
};
use crate::clock::{Clock, SystemClock};
use crate::error::{ForecastError, PartialDegradation, Section};
use crate::fetch::{CachedFetcher, FetchRequest};
use crate::format::{display_datetime, display_timestamp, parse_timestamp};
use crate::geocode::Geocoder;
use crate::normalize::{self, StationObservation, DAILY_LIMIT, HOURLY_LIMIT};
use crate::settings::ServiceSettings;
use crate::throttle::Throttle;
use crate::types::{AlertRecord, Coordinates, ForecastOptions, ForecastRecord, GeocodeResult, Severity};

/// Canonical location chosen for a request.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedLocation {
    key: String,
    label: String,
}

pub struct ForecastService {
    settings: ServiceSettings,
    store: Arc<CacheStore>,
    clock: Arc<dyn Clock>,
    fetcher: CachedFetcher,
    geocoder: Geocoder,
    attributor: GeospatialAttributor,
}

impl ForecastService {
    /// Service backed by the cache file named in `config`.
    pub fn new(config: &Config) -> Result<Self, ForecastError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(CacheStore::new(
            Box::new(FileBackend::new(&config.cache.file)),
            clock.clone(),
        ));
        Self::with_parts(ServiceSettings::from(config), store, clock)
    }

    pub fn with_parts(
        settings: ServiceSettings,
        store: Arc<CacheStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ForecastError> {
        let fetcher = CachedFetcher::new(store.clone(), &settings.user_agent, settings.request_timeout)?;
        let geocoder = Geocoder::new(
            fetcher.clone(),
            &settings.geocoder_url,
            Arc::new(Throttle::new(settings.geocoder_min_interval)),
            settings.ttl.geocode,
        );
        let attributor = GeospatialAttributor::new(fetcher.clone(), geocoder.clone(), settings.ttl.zones);

        Ok(Self {
            settings,
            store,
            clock,
            fetcher,
            geocoder,
            attributor,
        })
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Unified forecast for a coordinate pair.
    ///
    /// Points metadata, the primary forecast, and the location key are mandatory; hourly
    /// data, alerts, and station observations degrade independently.
    #[instrument(skip(self, options), level = "info")]
    pub async fn resolve_forecast(
        &self,
        lat: f64,
        lon: f64,
        options: &ForecastOptions,
    ) -> Result<ForecastRecord, ForecastError> {
        let coords = Coordinates::new(lat, lon)?;
        let coord_alias = coordinate_alias(coords.lat, coords.lon);
        let cached_key = self.store.resolve_alias_async(&coord_alias).await;

        let points_url = format!("{}/points/{}", self.settings.weather_api_url, coords.to_query());
        let points: PointsResponse = self
            .fetcher
            .get(
                &FetchRequest::weather(&points_url, POINTS_GROUP, self.settings.ttl.points),
                None,
            )
            .await?;
        let points = points.properties;

        let forecast_url = points
            .forecast
            .clone()
            .ok_or_else(|| ForecastError::InvalidResponse("no forecast URL for this point".to_string()))?;

        let location = resolve_location(&points, options, cached_key.as_deref())?;
        if cached_key.as_deref() != Some(location.key.as_str()) {
            self.store.register_alias_async(&coord_alias, &location.key).await;
        }
        let group = location_group(Some(&location.key));

        let forecast: ForecastResponse = self
            .fetcher
            .get(
                &FetchRequest::weather(&forecast_url, &group, self.settings.ttl.forecast),
                None,
            )
            .await?;
        let forecast = forecast.properties;
        let Some(first_period) = forecast.periods.first() else {
            return Err(ForecastError::InvalidResponse(
                "no forecast periods for this location".to_string(),
            ));
        };
        let forecast_updated = forecast
            .update_time
            .as_deref()
            .or(forecast.generated_at.as_deref())
            .and_then(parse_timestamp);

        let (hourly, alerts, observation) = tokio::join!(
            self.fetch_hourly(&points, &group, options.include_hourly),
            self.fetch_alerts(coords, &group, options.include_alerts),
            self.fetch_observation(&points, &group, forecast_updated, options.include_observations),
        );

        let (hourly_periods, hourly_error) = split_section(hourly);
        let (alerts, alerts_error) = split_section(alerts);

        self.store
            .register_location_async(&location.key, &location.label, coords.lat, coords.lon)
            .await;

        let now = self.clock.now();
        let offset = first_period
            .start_time
            .as_deref()
            .and_then(parse_timestamp)
            .map(|t| *t.offset())
            .unwrap_or_else(|| Utc.fix());
        let local_now = now.with_timezone(&offset);

        Ok(ForecastRecord {
            location: location.label,
            location_key: location.key,
            time_zone: points.time_zone.clone(),
            period: normalize::summarize_period(first_period),
            next_period: forecast.periods.get(1).map(normalize::summarize_period),
            current: normalize::current_conditions(first_period, hourly_periods.first(), observation.as_ref()),
            hourly: normalize::build_hourly(&hourly_periods, now, HOURLY_LIMIT),
            daily: normalize::build_daily(&forecast.periods, now, DAILY_LIMIT),
            daily_details: normalize::build_daily_details(&hourly_periods, now, DAILY_LIMIT),
            alerts,
            hourly_error,
            alerts_error,
            data_as_of: display_timestamp(forecast.update_time.as_deref().or(forecast.generated_at.as_deref())),
            updated_at: display_datetime(&local_now),
        })
    }

    async fn fetch_hourly(
        &self,
        points: &PointsProperties,
        group: &str,
        include: bool,
    ) -> Option<Result<Vec<ApiPeriod>, PartialDegradation>> {
        if !include {
            return None;
        }
        let Some(url) = points.forecast_hourly.as_deref() else {
            return Some(Err(PartialDegradation::missing(Section::Hourly)));
        };
        let request = FetchRequest::weather(url, group, self.settings.ttl.forecast);
        let result = match self.fetcher.get::<ForecastResponse>(&request, None).await {
            Ok(hourly) => Ok(hourly.properties.periods),
            Err(e) => {
                tracing::warn!("Hourly forecast unavailable: {}", e);
                Err(PartialDegradation::new(Section::Hourly, &e))
            }
        };
        Some(result)
    }

    async fn fetch_alerts(
        &self,
        coords: Coordinates,
        group: &str,
        include: bool,
    ) -> Option<Result<Vec<AlertRecord>, PartialDegradation>> {
        if !include {
            return None;
        }
        let url = format!("{}/alerts/active", self.settings.weather_api_url);
        let request = FetchRequest::weather(&url, group, self.settings.ttl.forecast).param("point", coords.to_query());
        let response: AlertsResponse = match self.fetcher.get(&request, None).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Alerts unavailable: {}", e);
                return Some(Err(PartialDegradation::new(Section::Alerts, &e)));
            }
        };

        let mut alerts = Vec::with_capacity(response.features.len());
        for feature in response.features {
            let props = feature.properties;
            let severity = Severity::from_raw(props.severity.as_deref());
            let areas = self
                .attributor
                .attribute(&props.affected_zones, props.area_desc.as_deref(), coords, severity)
                .await;
            alerts.push(alert::build_record(props, areas));
        }
        Some(Ok(alerts))
    }

    /// Freshest usable station observation; every failure here is absorbed.
    async fn fetch_observation(
        &self,
        points: &PointsProperties,
        group: &str,
        forecast_updated: Option<DateTime<FixedOffset>>,
        include: bool,
    ) -> Option<StationObservation> {
        if !include {
            return None;
        }
        let stations_url = points.observation_stations.as_deref()?;
        let request = FetchRequest::weather(stations_url, group, self.settings.ttl.stations);
        let stations: StationsResponse = match self.fetcher.get(&request, None).await {
            Ok(stations) => stations,
            Err(e) => {
                tracing::debug!("Station list unavailable: {}", e);
                return None;
            }
        };

        let station_ids = stations
            .features
            .into_iter()
            .filter_map(|f| f.properties.station_identifier)
            .take(self.settings.max_stations);

        let mut observations = Vec::new();
        for station_id in station_ids {
            let url = format!(
                "{}/stations/{}/observations/latest",
                self.settings.weather_api_url, station_id
            );
            let request = FetchRequest::weather(&url, group, self.settings.ttl.forecast);
            match self.fetcher.get::<ObservationResponse>(&request, None).await {
                Ok(latest) => {
                    if let Some(observation) = StationObservation::new(station_id, latest.properties) {
                        observations.push(observation);
                    }
                }
                Err(e) => tracing::debug!("Skipping station {}: {}", station_id, e),
            }
        }

        normalize::select_observation(
            observations,
            forecast_updated,
            self.clock.now(),
            self.settings.observation_max_age,
        )
    }

    /// Geocode free text or a ZIP code. A result with city and state also aliases the
    /// input text to its canonical key.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve_address(&self, text: &str) -> Result<GeocodeResult, ForecastError> {
        let result = self.geocoder.resolve(text).await?;
        if let (Some(alias), Some(key)) = (address_alias(text), result.canonical_key()) {
            self.store.register_alias_async(&alias, &key).await;
        }
        Ok(result)
    }

    pub async fn list_known_locations(&self) -> Vec<LocationSummary> {
        self.store.list_locations_async().await
    }

    pub async fn purge_all(&self) {
        tracing::info!("Purging all cached weather data");
        self.store.purge_all_async().await;
    }

    pub async fn purge_location(&self, location_key: &str) {
        tracing::info!("Purging cached data for {}", location_key);
        self.store.purge_location_async(location_key).await;
    }

    pub async fn delete_location(&self, location_key: &str) {
        tracing::info!("Deleting location {}", location_key);
        self.store.delete_location_async(location_key).await;
    }
}

impl std::fmt::Debug for ForecastService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastService")
            .field("settings", &self.settings)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Split an optional section into its data and degradation marker. Skipped sections
/// are empty and carry no error.
fn split_section<T>(section: Option<Result<Vec<T>, PartialDegradation>>) -> (Vec<T>, Option<PartialDegradation>) {
    match section {
        Some(Ok(items)) => (items, None),
        Some(Err(degradation)) => (Vec::new(), Some(degradation)),
        None => (Vec::new(), None),
    }
}

/// Canonical key and label for a request.
///
/// A preferred key from a prior geocode wins, then the city/state in the points
/// metadata, then an alias cached for these coordinates.
fn resolve_location(
    points: &PointsProperties,
    options: &ForecastOptions,
    cached_key: Option<&str>,
) -> Result<ResolvedLocation, ForecastError> {
    let fresh = match (points.city(), points.state()) {
        (Some(city), Some(state)) => location_key(city, state),
        _ => None,
    };

    let preferred = options
        .preferred_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string);
    if let Some(key) = preferred {
        let label = match (options.preferred_city.as_deref(), options.preferred_state.as_deref()) {
            (Some(city), Some(state)) => location_key(city, state),
            _ => None,
        }
        .unwrap_or_else(|| key.clone());
        return Ok(ResolvedLocation { key, label });
    }

    if let Some(key) = fresh {
        if let Some(stale) = cached_key.filter(|c| *c != key) {
            tracing::info!("Coordinate alias moved from {} to {}", stale, key);
        }
        return Ok(ResolvedLocation {
            label: key.clone(),
            key,
        });
    }

    cached_key
        .map(|key| ResolvedLocation {
            key: key.to_string(),
            label: key.to_string(),
        })
        .ok_or(ForecastError::LocationUndetermined)
}
