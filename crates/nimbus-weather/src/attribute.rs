//! Orders an alert's affected areas by distance from the requested point and
//! shades each one from its severity color.

use std::collections::HashSet;
use std::time::Duration;

use crate::api::ZoneResponse;
use crate::cache::ZONES_GROUP;
use crate::fetch::{CachedFetcher, FetchRequest};
use crate::geocode::Geocoder;
use crate::geometry::{haversine_miles, Geometry};
use crate::types::{AlertArea, Coordinates, Rgb, Severity, TextColor};

/// Areas farther than this are not shown.
pub const MAX_AREA_DISTANCE_MILES: f64 = 100.0;
/// Areas this close to the nearest one are all marked closest.
pub const CLOSEST_TOLERANCE_MILES: f64 = 0.25;
/// The farthest area is lightened this much toward white.
pub const MAX_LIGHTEN: f64 = 0.72;

const JURISDICTION_WORDS: [&str; 6] = ["county", "parish", "borough", "city", "district", "zone"];

pub fn base_color(severity: Severity) -> Rgb {
    match severity {
        Severity::Minor => Rgb::new(29, 78, 216),
        Severity::Moderate => Rgb::new(180, 83, 9),
        Severity::Severe => Rgb::new(185, 28, 28),
        Severity::Extreme => Rgb::new(127, 29, 29),
    }
}

/// Blend `base` toward white by `ratio * MAX_LIGHTEN`.
pub fn shade_from_base(base: Rgb, ratio: f64) -> Rgb {
    let t = ratio.clamp(0.0, 1.0) * MAX_LIGHTEN;
    let channel = |c: u8| {
        let c = f64::from(c);
        (c + (255.0 - c) * t).round().clamp(0.0, 255.0) as u8
    };
    Rgb::new(channel(base.r), channel(base.g), channel(base.b))
}

pub fn text_color(color: Rgb) -> TextColor {
    if color.luminance() > 0.6 {
        TextColor::Dark
    } else {
        TextColor::Light
    }
}

/// Split an alert's `areaDesc` into unique area names, preserving order.
pub fn split_area_desc(area_desc: &str) -> Vec<String> {
    let trimmed = |parts: Vec<&str>| -> Vec<String> {
        parts
            .into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut parts = trimmed(area_desc.split(';').collect());
    if parts.len() <= 1 {
        parts = trimmed(area_desc.split(',').collect());
    }

    let mut seen = HashSet::new();
    parts
        .into_iter()
        .filter(|p| seen.insert(p.to_lowercase()))
        .collect()
}

/// Geocoder queries for an area name: the bare name, then `"<name> County"` unless the
/// name already carries a jurisdiction word.
pub fn area_query_variants(name: &str) -> Vec<String> {
    let cleaned = name.trim();
    if cleaned.is_empty() {
        return Vec::new();
    }
    let lowered = cleaned.to_lowercase();
    if JURISDICTION_WORDS.iter().any(|w| lowered.contains(w)) {
        vec![cleaned.to_string()]
    } else {
        vec![cleaned.to_string(), format!("{} County", cleaned)]
    }
}

/// An area with its measured distance, before ordering and coloring.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredArea {
    pub name: String,
    pub distance_miles: Option<f64>,
    pub zone_id: Option<String>,
    pub state: Option<String>,
}

impl MeasuredArea {
    fn named(name: impl Into<String>, distance_miles: Option<f64>) -> Self {
        Self {
            name: name.into(),
            distance_miles,
            zone_id: None,
            state: None,
        }
    }
}

/// Filter, order, and color measured areas.
///
/// Areas with unknown distance are kept, sorted last, and shaded as the farthest.
pub fn finalize(areas: Vec<MeasuredArea>, severity: Severity) -> Vec<AlertArea> {
    let mut areas: Vec<MeasuredArea> = areas
        .into_iter()
        .filter(|a| a.distance_miles.map_or(true, |d| d <= MAX_AREA_DISTANCE_MILES))
        .collect();
    areas.sort_by(|a, b| match (a.distance_miles, b.distance_miles) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });

    let known = areas.iter().filter_map(|a| a.distance_miles);
    let min = known.clone().min_by(f64::total_cmp);
    let max = known.max_by(f64::total_cmp);
    let base = base_color(severity);

    areas
        .into_iter()
        .map(|area| {
            let (ratio, is_closest) = match (area.distance_miles, min, max) {
                (Some(d), Some(min), Some(max)) => {
                    let ratio = if max > min { (d - min) / (max - min) } else { 0.0 };
                    (ratio, (d - min).abs() < CLOSEST_TOLERANCE_MILES)
                }
                _ => (1.0, false),
            };
            let color = shade_from_base(base, ratio);
            AlertArea {
                name: area.name,
                distance_miles: area.distance_miles,
                color,
                text_color: text_color(color),
                is_closest,
                zone_id: area.zone_id,
                state: area.state,
            }
        })
        .collect()
}

/// `"<name>, <state>"` unless the state is already part of the name.
fn zone_display_name(name: &str, state: Option<&str>) -> String {
    match state.map(str::trim).filter(|s| !s.is_empty()) {
        Some(state) if !name.split(|c: char| !c.is_alphanumeric()).any(|w| w == state) => {
            format!("{}, {}", name, state)
        }
        _ => name.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct GeospatialAttributor {
    fetcher: CachedFetcher,
    geocoder: Geocoder,
    zone_ttl: Duration,
}

impl GeospatialAttributor {
    pub fn new(fetcher: CachedFetcher, geocoder: Geocoder, zone_ttl: Duration) -> Self {
        Self {
            fetcher,
            geocoder,
            zone_ttl,
        }
    }

    /// Ordered, colored areas for one alert. Zone geometry is preferred; the area
    /// description is used when no zone could be loaded.
    pub async fn attribute(
        &self,
        zone_urls: &[String],
        area_desc: Option<&str>,
        origin: Coordinates,
        severity: Severity,
    ) -> Vec<AlertArea> {
        let mut measured = self.measure_zones(zone_urls, origin).await;
        if measured.is_empty() {
            if let Some(desc) = area_desc {
                measured = self.measure_described(desc, origin).await;
            }
        }
        finalize(measured, severity)
    }

    async fn measure_zones(&self, zone_urls: &[String], origin: Coordinates) -> Vec<MeasuredArea> {
        let mut seen = HashSet::new();
        let mut areas = Vec::new();

        for url in zone_urls {
            let request = FetchRequest::weather(url, ZONES_GROUP, self.zone_ttl);
            let zone: ZoneResponse = match self.fetcher.get(&request, None).await {
                Ok(zone) => zone,
                Err(e) => {
                    tracing::debug!("Skipping alert zone {}: {}", url, e);
                    continue;
                }
            };

            let props = zone.properties;
            let zone_id = props
                .id
                .clone()
                .or_else(|| url.rsplit('/').next().map(str::to_string))
                .filter(|id| !id.is_empty());
            let Some(name) = props.name.clone().or_else(|| zone_id.clone()) else {
                continue;
            };
            let dedup_key = zone_id.clone().unwrap_or_else(|| name.to_lowercase());
            if !seen.insert(dedup_key) {
                continue;
            }

            let distance = match zone.geometry.as_ref().and_then(Geometry::from_raw) {
                Some(geometry) => geometry.distance_miles(origin.lat, origin.lon),
                None => {
                    let queries = area_query_variants(&name)
                        .into_iter()
                        .map(|q| match props.state.as_deref() {
                            Some(state) => format!("{}, {}", q, state),
                            None => q,
                        })
                        .collect::<Vec<_>>();
                    self.locate(&queries, origin).await
                }
            };

            areas.push(MeasuredArea {
                name: zone_display_name(&name, props.state.as_deref()),
                distance_miles: distance,
                zone_id,
                state: props.state,
            });
        }
        areas
    }

    async fn measure_described(&self, area_desc: &str, origin: Coordinates) -> Vec<MeasuredArea> {
        let mut areas = Vec::new();
        for name in split_area_desc(area_desc) {
            let distance = self.locate(&area_query_variants(&name), origin).await;
            areas.push(MeasuredArea::named(name, distance));
        }
        areas
    }

    /// Haversine distance to the first query the geocoder can place.
    async fn locate(&self, queries: &[String], origin: Coordinates) -> Option<f64> {
        for query in queries {
            if let Some((lat, lon)) = self.geocoder.resolve_place(query).await {
                return Some(haversine_miles(origin.lat, origin.lon, lat, lon));
            }
        }
        tracing::debug!("Could not place alert area {:?}", queries.first());
        None
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::cache::CacheStore;
    use crate::clock::SystemClock;
    use crate::throttle::Throttle;
    use serde_json::json;
    use std::sync::Arc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORIGIN: Coordinates = Coordinates {
        lat: 40.4406,
        lon: -79.9959,
    };

    fn attributor(server: &MockServer) -> GeospatialAttributor {
        let store = Arc::new(CacheStore::in_memory(Arc::new(SystemClock)));
        let fetcher = CachedFetcher::new(store, "nimbus-test (test@example.com)", Duration::from_secs(5)).unwrap();
        let geocoder = Geocoder::new(
            fetcher.clone(),
            &server.uri(),
            Arc::new(Throttle::new(Duration::ZERO)),
            Duration::from_secs(3600),
        );
        GeospatialAttributor::new(fetcher, geocoder, Duration::from_secs(3600))
    }

    fn at(name: &str, distance: f64) -> MeasuredArea {
        MeasuredArea::named(name, Some(distance))
    }

    #[test]
    fn test_split_area_desc() {
        assert_eq!(
            split_area_desc("Allegheny; Beaver; allegheny; Butler"),
            vec!["Allegheny", "Beaver", "Butler"]
        );
        assert_eq!(split_area_desc("Allegheny, Beaver"), vec!["Allegheny", "Beaver"]);
        assert_eq!(split_area_desc("Allegheny County"), vec!["Allegheny County"]);
        assert!(split_area_desc("  ;  ").is_empty());
    }

    #[test]
    fn test_area_query_variants() {
        assert_eq!(area_query_variants("Allegheny County"), vec!["Allegheny County"]);
        assert_eq!(area_query_variants("Orleans Parish"), vec!["Orleans Parish"]);
        assert_eq!(area_query_variants("Beaver"), vec!["Beaver", "Beaver County"]);
        assert!(area_query_variants(" ").is_empty());
    }

    #[test]
    fn test_shade_and_text_color() {
        let base = base_color(Severity::Severe);
        assert_eq!(shade_from_base(base, 0.0), base);
        assert_eq!(shade_from_base(base, -1.0), base);
        let lightest = shade_from_base(base, 1.0);
        assert_eq!(lightest, shade_from_base(base, 5.0));
        assert!(lightest.r < 255 && lightest.g < 255);
        assert_eq!(text_color(base), TextColor::Light);
        assert_eq!(text_color(Rgb::WHITE), TextColor::Dark);
    }

    #[test]
    fn test_lightening_is_monotonic_with_distance() {
        let areas = finalize(
            vec![at("Far", 60.0), at("Near", 2.0), at("Middle", 20.0), at("Edge", 90.0)],
            Severity::Moderate,
        );
        let names: Vec<_> = areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Near", "Middle", "Far", "Edge"]);

        for pair in areas.windows(2) {
            let (a, b) = (pair[0].color, pair[1].color);
            assert!(a.r <= b.r && a.g <= b.g && a.b <= b.b, "{:?} then {:?}", a, b);
        }
        assert_eq!(areas[0].color, base_color(Severity::Moderate));
        assert!(areas[0].is_closest);
        assert!(areas[1..].iter().all(|a| !a.is_closest));
    }

    #[test]
    fn test_closest_ties_are_all_marked() {
        let areas = finalize(vec![at("A", 5.0), at("B", 5.2), at("C", 5.3)], Severity::Minor);
        let closest: Vec<_> = areas.iter().filter(|a| a.is_closest).map(|a| a.name.as_str()).collect();
        assert_eq!(closest, vec!["A", "B"]);
    }

    #[test]
    fn test_far_areas_dropped_unknown_sorted_last() {
        let areas = finalize(
            vec![
                MeasuredArea::named("Unknown", None),
                at("Too far", 140.0),
                at("Here", 0.0),
            ],
            Severity::Extreme,
        );
        let names: Vec<_> = areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Here", "Unknown"]);
        assert!(!areas[1].is_closest);
        assert_eq!(areas[1].color, shade_from_base(base_color(Severity::Extreme), 1.0));
    }

    #[test]
    fn test_zone_display_name() {
        assert_eq!(zone_display_name("Allegheny", Some("PA")), "Allegheny, PA");
        assert_eq!(zone_display_name("Allegheny, PA", Some("PA")), "Allegheny, PA");
        assert_eq!(zone_display_name("Allegheny", None), "Allegheny");
    }

    #[tokio::test]
    async fn test_description_fallback_geocodes_each_area() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Allegheny County"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"lat": "40.4406", "lon": "-79.9959"}])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Beaver"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "Beaver County"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"lat": "40.68", "lon": "-80.35"}])))
            .expect(1)
            .mount(&server)
            .await;

        let areas = attributor(&server)
            .attribute(&[], Some("Beaver; Allegheny County"), ORIGIN, Severity::Severe)
            .await;
        let names: Vec<_> = areas.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Allegheny County", "Beaver"]);
        assert_eq!(areas[0].distance_miles, Some(0.0));
        assert!(areas[1].distance_miles.unwrap() > 20.0);
    }

    #[tokio::test]
    async fn test_zone_geometry_preferred_and_deduplicated() {
        let server = MockServer::start().await;
        let zone = json!({
            "properties": {"id": "PAC003", "name": "Allegheny", "state": "PA"},
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[-80.4, 40.2], [-79.6, 40.2], [-79.6, 40.7], [-80.4, 40.7], [-80.4, 40.2]]]
            }
        });
        Mock::given(method("GET"))
            .and(path("/zones/county/PAC003"))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&server)
            .await;

        let url = format!("{}/zones/county/PAC003", server.uri());
        let areas = attributor(&server)
            .attribute(&[url.clone(), url], Some("Allegheny"), ORIGIN, Severity::Minor)
            .await;
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].name, "Allegheny, PA");
        assert_eq!(areas[0].distance_miles, Some(0.0));
        assert_eq!(areas[0].zone_id.as_deref(), Some("PAC003"));
        assert!(areas[0].is_closest);
    }

    #[tokio::test]
    async fn test_unreachable_zones_fall_back_to_description() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/zones/forecast/PAZ021"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let url = format!("{}/zones/forecast/PAZ021", server.uri());
        let areas = attributor(&server)
            .attribute(&[url], Some("Allegheny County"), ORIGIN, Severity::Severe)
            .await;
        assert_eq!(areas.len(), 1);
        assert_eq!(areas[0].name, "Allegheny County");
        assert_eq!(areas[0].distance_miles, None);
        assert!(!areas[0].is_closest);
    }
}
