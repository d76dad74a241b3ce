use nimbus_core::Config;
use std::time::Duration;

/// One year; larger configured ages are clamped.
const MAX_OBSERVATION_AGE_MINUTES: i64 = 365 * 24 * 60;

/// Runtime settings for the forecast service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub user_agent: String,
    /// weather.gov base URL, without trailing slash
    pub weather_api_url: String,
    /// Nominatim base URL, without trailing slash
    pub geocoder_url: String,
    pub request_timeout: Duration,
    pub geocoder_min_interval: Duration,
    pub max_stations: usize,
    pub observation_max_age: chrono::Duration,
    pub ttl: CacheTtls,
}

#[derive(Debug, Clone, Copy)]
pub struct CacheTtls {
    pub points: Duration,
    pub forecast: Duration,
    pub stations: Duration,
    pub zones: Duration,
    pub geocode: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            points: Duration::from_secs(5 * 60),
            forecast: Duration::from_secs(5 * 60),
            stations: Duration::from_secs(60 * 60),
            zones: Duration::from_secs(24 * 60 * 60),
            geocode: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ServiceSettings {
    /// Settings pointing both upstreams at `base_url` (for testing against a mock server).
    pub fn for_base_url(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/').to_string();
        Self {
            user_agent: "nimbus-test (test@example.com)".to_string(),
            weather_api_url: base.clone(),
            geocoder_url: base,
            request_timeout: Duration::from_secs(5),
            geocoder_min_interval: Duration::ZERO,
            max_stations: 5,
            observation_max_age: chrono::Duration::minutes(120),
            ttl: CacheTtls::default(),
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        let upstream = &config.upstream;
        let cache = &config.cache;
        Self {
            user_agent: upstream.user_agent.clone(),
            weather_api_url: upstream.weather_api_url.trim_end_matches('/').to_string(),
            geocoder_url: upstream.geocoder_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(upstream.request_timeout_secs),
            geocoder_min_interval: Duration::from_millis(upstream.geocoder_min_interval_ms),
            max_stations: upstream.max_stations,
            observation_max_age: chrono::Duration::minutes(
                upstream
                    .observation_max_age_minutes
                    .clamp(0, MAX_OBSERVATION_AGE_MINUTES),
            ),
            ttl: CacheTtls {
                points: Duration::from_secs(cache.points_ttl_secs),
                forecast: Duration::from_secs(cache.forecast_ttl_secs),
                stations: Duration::from_secs(cache.stations_ttl_secs),
                zones: Duration::from_secs(cache.zone_ttl_secs),
                geocode: Duration::from_secs(cache.geocode_ttl_secs),
            },
        }
    }
}
