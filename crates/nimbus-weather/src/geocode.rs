//! Forward geocoding through Nominatim (OpenStreetMap).
//!
//! All requests share one `Throttle` because Nominatim bans clients that exceed
//! one request per second. Results are cached for a day in the `geocode` group.

use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::api::NominatimPlace;
use crate::cache::GEOCODE_GROUP;
use crate::error::{ForecastError, InputError};
use crate::fetch::{CachedFetcher, FetchRequest};
use crate::throttle::Throttle;
use crate::types::GeocodeResult;

/// Normalize a US ZIP code to `DDDDD` or `DDDDD-DDDD`.
pub fn normalize_zip(query: &str) -> Option<String> {
    let digits = |s: &str, n: usize| s.len() == n && s.chars().all(|c| c.is_ascii_digit());
    if digits(query, 5) {
        return Some(query.to_string());
    }
    if digits(query, 9) {
        return Some(format!("{}-{}", &query[..5], &query[5..]));
    }
    let (head, tail) = query.split_once('-')?;
    (digits(head, 5) && digits(tail, 4)).then(|| query.to_string())
}

#[derive(Debug, Clone)]
pub struct Geocoder {
    fetcher: CachedFetcher,
    throttle: Arc<Throttle>,
    search_url: String,
    ttl: Duration,
}

impl Geocoder {
    pub fn new(fetcher: CachedFetcher, base_url: &str, throttle: Arc<Throttle>, ttl: Duration) -> Self {
        Self {
            fetcher,
            throttle,
            search_url: format!("{}/search", base_url.trim_end_matches('/')),
            ttl,
        }
    }

    /// Resolve free text or a ZIP code to coordinates plus city/state.
    #[instrument(skip(self), level = "info")]
    pub async fn resolve(&self, query: &str) -> Result<GeocodeResult, ForecastError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(InputError::EmptyAddress.into());
        }

        let places = match normalize_zip(query) {
            Some(zip) => {
                let by_postal = self
                    .search(&[("postalcode", zip.clone()), ("countrycodes", "us".to_string())])
                    .await?;
                if by_postal.is_empty() {
                    tracing::debug!("No postal code match for {}, retrying as free text", zip);
                    self.search(&[("q", format!("{} USA", zip))]).await?
                } else {
                    by_postal
                }
            }
            None => self.search(&[("q", query.to_string())]).await?,
        };

        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| ForecastError::NotFound(query.to_string()))?;
        let (lat, lon) = place
            .coordinates()
            .ok_or_else(|| ForecastError::NotFound(format!("{} (no coordinates)", query)))?;

        let address = place.address.unwrap_or_default();
        Ok(GeocodeResult {
            lat,
            lon,
            city: address.city(),
            state: address.state(),
            display_name: place.display_name,
        })
    }

    /// Coordinates for a place name, or `None` on any failure.
    pub async fn resolve_place(&self, name: &str) -> Option<(f64, f64)> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        match self.search(&[("q", name.to_string())]).await {
            Ok(places) => places.first().and_then(NominatimPlace::coordinates),
            Err(e) => {
                tracing::debug!("Place lookup for {} failed: {}", name, e);
                None
            }
        }
    }

    async fn search(&self, params: &[(&'static str, String)]) -> Result<Vec<NominatimPlace>, ForecastError> {
        let mut request = FetchRequest::geocoder(&self.search_url, GEOCODE_GROUP, self.ttl)
            .param("format", "json")
            .param("limit", "1")
            .param("addressdetails", "1");
        for (name, value) in params {
            request = request.param(*name, value.clone());
        }
        self.fetcher.get(&request, Some(self.throttle.as_ref())).await
    }
}
