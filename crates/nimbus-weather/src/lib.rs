//! Weather core for nimbus
//!
//! Fetches weather.gov forecasts and Nominatim geocoding results, normalizes them
//! into a stable forecast model, and keeps a persistent daily-invalidated cache.

pub mod alert;
pub mod api;
pub mod attribute;
pub mod cache;
pub mod clock;
pub mod error;
pub mod fetch;
pub mod format;
pub mod geocode;
pub mod geometry;
pub mod normalize;
pub mod provider;
pub mod settings;
pub mod throttle;
pub mod types;

pub use attribute::GeospatialAttributor;
pub use cache::{CacheBackend, CacheStore, FileBackend, LocationSummary, MemoryBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ForecastError, InputError, PartialDegradation, Section};
pub use geocode::Geocoder;
pub use provider::ForecastService;
pub use settings::{CacheTtls, ServiceSettings};
pub use throttle::Throttle;
pub use types::*;
