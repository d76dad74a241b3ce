//! Cache-checked JSON GETs against the upstream APIs.

use reqwest::Client;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::cache::CacheStore;
use crate::error::ForecastError;
use crate::throttle::Throttle;

/// Which upstream a request targets; decides the request headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Weather,
    Geocoder,
}

impl Upstream {
    fn accept(self) -> &'static str {
        match self {
            Upstream::Weather => "application/geo+json",
            Upstream::Geocoder => "application/json",
        }
    }
}

/// Stable cache key: the URL plus its query parameters sorted by name.
pub fn fingerprint(url: &str, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(&b.1)));

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in sorted {
        query.append_pair(name, value);
    }
    format!("{}?{}", url, query.finish())
}

/// One GET, with its cache placement.
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    url: &'a str,
    params: Vec<(&'a str, String)>,
    upstream: Upstream,
    group: &'a str,
    ttl: Duration,
}

impl<'a> FetchRequest<'a> {
    pub fn weather(url: &'a str, group: &'a str, ttl: Duration) -> Self {
        Self {
            url,
            params: Vec::new(),
            upstream: Upstream::Weather,
            group,
            ttl,
        }
    }

    pub fn geocoder(url: &'a str, group: &'a str, ttl: Duration) -> Self {
        Self {
            upstream: Upstream::Geocoder,
            ..Self::weather(url, group, ttl)
        }
    }

    pub fn param(mut self, name: &'a str, value: impl Into<String>) -> Self {
        self.params.push((name, value.into()));
        self
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(self.url, &self.params)
    }
}

/// HTTP client sharing the persistent cache.
#[derive(Debug, Clone)]
pub struct CachedFetcher {
    client: Client,
    store: Arc<CacheStore>,
    user_agent: String,
}

impl CachedFetcher {
    pub fn new(
        store: Arc<CacheStore>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ForecastError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            store,
            user_agent: user_agent.to_string(),
        })
    }

    /// Cached JSON for `request`, fetching it on a miss. `throttle` is only
    /// consulted when the network is actually hit.
    #[instrument(skip(self, throttle), fields(url = request.url, group = request.group), level = "debug")]
    pub async fn get_json(
        &self,
        request: &FetchRequest<'_>,
        throttle: Option<&Throttle>,
    ) -> Result<serde_json::Value, ForecastError> {
        let key = request.fingerprint();
        if let Some(cached) = self.store.get_async(request.group, &key).await {
            tracing::debug!("Cache hit for {}", key);
            return Ok(cached);
        }

        if let Some(throttle) = throttle {
            throttle.wait().await;
        }

        tracing::info!("Fetching {}", key);
        let mut builder = self
            .client
            .get(request.url)
            .header(reqwest::header::USER_AGENT, &self.user_agent)
            .header(reqwest::header::ACCEPT, request.upstream.accept());
        if request.upstream == Upstream::Geocoder {
            builder = builder.header(reqwest::header::ACCEPT_LANGUAGE, "en");
        }
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ForecastError::Upstream {
                status: status.as_u16(),
                message: text.chars().take(200).collect(),
            });
        }

        // A timeout while reading the body is still an unreachable upstream
        let value: serde_json::Value = response.json().await.map_err(ForecastError::from)?;

        self.store
            .put_async(request.group, &key, value.clone(), request.ttl)
            .await;
        Ok(value)
    }

    /// Like `get_json`, decoded into `T` at the boundary.
    pub async fn get<T: DeserializeOwned>(
        &self,
        request: &FetchRequest<'_>,
        throttle: Option<&Throttle>,
    ) -> Result<T, ForecastError> {
        let value = self.get_json(request, throttle).await?;
        serde_json::from_value(value).map_err(|e| ForecastError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::clock::SystemClock;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> CachedFetcher {
        let store = Arc::new(CacheStore::in_memory(Arc::new(SystemClock)));
        CachedFetcher::new(store, "nimbus-test (test@example.com)", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_fingerprint_sorts_params() {
        let a = fingerprint(
            "https://geo/search",
            &[("q", "15213 USA".to_string()), ("format", "json".to_string())],
        );
        let b = fingerprint(
            "https://geo/search",
            &[("format", "json".to_string()), ("q", "15213 USA".to_string())],
        );
        assert_eq!(a, b);
        assert_eq!(a, "https://geo/search?format=json&q=15213+USA");
        assert_eq!(fingerprint("https://x/points/1,2", &[]), "https://x/points/1,2");
    }

    #[tokio::test]
    async fn test_weather_headers_and_cache_hit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/points/40.4406,-79.9959"))
            .and(header("Accept", "application/geo+json"))
            .and(header("User-Agent", "nimbus-test (test@example.com)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/points/40.4406,-79.9959", server.uri());
        let request = FetchRequest::weather(&url, "points_api", Duration::from_secs(60));

        let first = fetcher.get_json(&request, None).await.unwrap();
        let second = fetcher.get_json(&request, None).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_geocoder_headers_and_params() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Erie"))
            .and(header("Accept-Language", "en"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/search", server.uri());
        let request = FetchRequest::geocoder(&url, "geocode", Duration::from_secs(60)).param("q", "Erie");
        let value = fetcher.get_json(&request, None).await.unwrap();
        assert_eq!(value, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_error_status_maps_to_upstream_and_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gridpoints/PBZ/1,1/forecast"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(2)
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/gridpoints/PBZ/1,1/forecast", server.uri());
        let request = FetchRequest::weather(&url, "loc:Pittsburgh, PA", Duration::from_secs(60));

        for _ in 0..2 {
            let err = fetcher.get_json(&request, None).await.unwrap_err();
            assert!(matches!(err, ForecastError::Upstream { status: 503, .. }));
        }
    }

    #[tokio::test]
    async fn test_non_json_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher();
        let url = format!("{}/points/1,1", server.uri());
        let request = FetchRequest::weather(&url, "points_api", Duration::from_secs(60));
        let err = fetcher.get_json(&request, None).await.unwrap_err();
        assert!(matches!(err, ForecastError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_slow_upstream_is_unreachable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"ok": true}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let store = Arc::new(CacheStore::in_memory(Arc::new(SystemClock)));
        let fetcher = CachedFetcher::new(store, "nimbus-test (test@example.com)", Duration::from_millis(200)).unwrap();
        let url = format!("{}/points/1,1", server.uri());
        let request = FetchRequest::weather(&url, "points_api", Duration::from_secs(60));
        let err = fetcher.get_json(&request, None).await.unwrap_err();
        assert!(matches!(err, ForecastError::Unreachable(_)), "{:?}", err);
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let fetcher = fetcher();
        let request = FetchRequest::weather("http://127.0.0.1:1/points/1,1", "points_api", Duration::from_secs(60));
        let err = fetcher.get_json(&request, None).await.unwrap_err();
        assert!(matches!(err, ForecastError::Unreachable(_)));
    }
}
