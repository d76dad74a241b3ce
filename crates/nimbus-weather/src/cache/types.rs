use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One cached upstream payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub expires_at: DateTime<Utc>,
    pub value: serde_json::Value,
}

impl CacheEntry {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Fingerprint → entry for one named group.
pub type CacheGroup = HashMap<String, CacheEntry>;

/// Last-known label and coordinates for a canonical location key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationRecord {
    pub label: String,
    pub lat: f64,
    pub lon: f64,
    pub updated_at: DateTime<Utc>,
}

/// Entry returned by `CacheStore::list_locations`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSummary {
    pub key: String,
    pub label: String,
    pub lat: f64,
    pub lon: f64,
}

/// Root persisted structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheFile {
    pub epoch_date: NaiveDate,
    #[serde(default)]
    pub groups: HashMap<String, CacheGroup>,
    #[serde(default)]
    pub locations: HashMap<String, LocationRecord>,
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

impl CacheFile {
    pub fn empty(today: NaiveDate) -> Self {
        Self {
            epoch_date: today,
            groups: HashMap::new(),
            locations: HashMap::new(),
            aliases: HashMap::new(),
        }
    }

    /// Discard everything if the file belongs to another day. Returns true when reset.
    pub fn ensure_epoch(&mut self, today: NaiveDate) -> bool {
        if self.epoch_date == today {
            return false;
        }
        *self = Self::empty(today);
        true
    }
}

/// Longest lifetime an entry may be given.
const MAX_TTL_DAYS: i64 = 36_500;

/// Expiry for an entry written at `now`. Oversized TTLs are clamped.
pub fn expiry(now: DateTime<Utc>, ttl: std::time::Duration) -> DateTime<Utc> {
    let cap = chrono::Duration::days(MAX_TTL_DAYS);
    let ttl = chrono::Duration::from_std(ttl).map_or(cap, |t| t.min(cap));
    now.checked_add_signed(ttl).unwrap_or(now)
}

/// Drop every entry whose expiry has passed.
pub fn prune_group(group: &mut CacheGroup, now: DateTime<Utc>) {
    group.retain(|_, entry| entry.is_live(now));
}
