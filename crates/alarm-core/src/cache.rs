//! Address resolution with a time-bounded in-memory cache in front of a [`Geocoder`].

use std::collections::HashMap;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::telemetry::Coordinates;
use crate::Geocoder;

/// Spoken in place of an address when the geocoder has no result.
pub const LOCATION_NOT_FOUND: &str = "Location not found";
/// Spoken in place of an address when the geocoder could not be reached or refused.
pub const UNABLE_TO_FETCH_ADDRESS: &str = "Unable to fetch address";

/// Cache tuning.
#[derive(Debug, Clone, Copy)]
pub struct CacheSettings {
    /// How long a resolved address stays valid.
    pub ttl: Duration,
    /// Upper bound on stored entries; 0 disables the bound.
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            max_entries: 10_000,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    address: String,
    expires_at: Instant,
}

/// Resolves coordinates to addresses, calling the geocoder only on a miss.
///
/// Cloning is cheap and clones share the same entries, so one instance can be created at
/// startup and handed to every request. Lookups never fail: geocoder problems degrade to
/// [`LOCATION_NOT_FOUND`] or [`UNABLE_TO_FETCH_ADDRESS`], and those are never cached.
#[derive(Clone)]
pub struct AddressCache {
    geocoder: Arc<dyn Geocoder>,
    settings: CacheSettings,
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    // one gate per key being fetched, so concurrent misses share a single lookup
    inflight: Arc<Gates>,
}

type Gates = std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>;

/// Holds a key's gate and removes it from the in-flight map when dropped, including when
/// the resolving future is cancelled.
struct GateRelease<'a> {
    gates: &'a Gates,
    key: &'a str,
    gate: Arc<Mutex<()>>,
}

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if gates.get(self.key).is_some_and(|g| Arc::ptr_eq(g, &self.gate)) {
            gates.remove(self.key);
        }
    }
}

impl AddressCache {
    pub fn new(geocoder: Arc<dyn Geocoder>, settings: CacheSettings) -> Self {
        Self {
            geocoder,
            settings,
            entries: Arc::new(RwLock::new(HashMap::new())),
            inflight: Arc::new(std::sync::Mutex::new(HashMap::new())),
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Address for a position, or a sentinel string when none can be produced.
    pub async fn resolve(&self, coordinates: Option<Coordinates>) -> String {
        let Some(coordinates) = coordinates else {
            debug!("No position in telemetry, skipping geocoding");
            return LOCATION_NOT_FOUND.to_string();
        };

        let key = cache_key(coordinates);
        if let Some(address) = self.lookup(&key).await {
            debug!("Address cache hit for {}", key);
            return address;
        }

        let release = self.gate(&key);
        let guard = release.gate.lock().await;

        // another task may have filled the entry while we waited on the gate
        let address = match self.lookup(&key).await {
            Some(address) => {
                debug!("Address cache filled concurrently for {}", key);
                address
            }
            None => self.fetch(&key, coordinates).await,
        };

        drop(guard);
        drop(release);
        address
    }

    /// Number of stored entries. Expired ones count until the next insert or purge drops them.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) {
        let mut entries = self.entries.write().await;
        purge(&mut entries, Instant::now());
    }

    async fn fetch(&self, key: &str, coordinates: Coordinates) -> String {
        debug!(
            "Address cache miss for {}, asking {}",
            key,
            self.geocoder.provider()
        );
        match self.geocoder.reverse(coordinates).await {
            Ok(Some(address)) => {
                self.insert(key, &address).await;
                address
            }
            Ok(None) => {
                debug!("No address found for {}", key);
                LOCATION_NOT_FOUND.to_string()
            }
            Err(e) => {
                warn!("Error fetching address for {}: {}", key, e);
                UNABLE_TO_FETCH_ADDRESS.to_string()
            }
        }
    }

    async fn lookup(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.address.clone())
    }

    async fn insert(&self, key: &str, address: &str) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        purge(&mut entries, now);

        let max = self.settings.max_entries;
        if max > 0 && entries.len() >= max && !entries.contains_key(key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.expires_at)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                debug!("Address cache full, evicting {}", oldest);
                entries.remove(&oldest);
            }
        }

        entries.insert(
            key.to_string(),
            CacheEntry {
                address: address.to_string(),
                expires_at: now + self.settings.ttl,
            },
        );
    }

    fn gate<'a>(&'a self, key: &'a str) -> GateRelease<'a> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        let gate = inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        GateRelease {
            gates: &self.inflight,
            key,
            gate,
        }
    }
}

fn purge(entries: &mut HashMap<String, CacheEntry>, now: Instant) {
    entries.retain(|key, entry| {
        let keep = entry.expires_at > now;
        if !keep {
            debug!("Evicted expired address for {}", key);
        }
        keep
    });
}

/// Canonical cache key: both coordinates at six decimals, negative zero folded into zero.
pub fn cache_key(coordinates: Coordinates) -> String {
    format!(
        "{:.6},{:.6}",
        canonical_degrees(coordinates.latitude),
        canonical_degrees(coordinates.longitude)
    )
}

fn canonical_degrees(value: f64) -> f64 {
    // adding 0.0 turns -0.0 into 0.0
    (value * 1e6).round() / 1e6 + 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeocodeError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGeocoder {
        calls: AtomicUsize,
        outcome: Outcome,
    }

    #[derive(Default, Clone, Copy)]
    enum Outcome {
        #[default]
        Found,
        Empty,
        Fail,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        fn provider(&self) -> &'static str {
            "counting"
        }

        async fn reverse(
            &self,
            coordinates: Coordinates,
        ) -> Result<Option<String>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            match self.outcome {
                Outcome::Found => Ok(Some(format!(
                    "{} / {}",
                    coordinates.latitude, coordinates.longitude
                ))),
                Outcome::Empty => Ok(None),
                Outcome::Fail => Err(GeocodeError::Http("connection refused".into())),
            }
        }
    }

    fn cache_with(outcome: Outcome, settings: CacheSettings) -> (AddressCache, Arc<CountingGeocoder>) {
        let geocoder = Arc::new(CountingGeocoder {
            outcome,
            ..Default::default()
        });
        (AddressCache::new(geocoder.clone(), settings), geocoder)
    }

    fn calls(geocoder: &CountingGeocoder) -> usize {
        geocoder.calls.load(Ordering::SeqCst)
    }

    #[test]
    fn keys_are_canonical() {
        assert_eq!(
            cache_key(Coordinates::new(40.0, -73.0)),
            "40.000000,-73.000000"
        );
        assert_eq!(
            cache_key(Coordinates::new(40.1234564, 0.0)),
            cache_key(Coordinates::new(40.12345640000001, -0.0))
        );
        assert_eq!(cache_key(Coordinates::new(-0.0000001, 0.0)), "0.000000,0.000000");
    }

    #[tokio::test(start_paused = true)]
    async fn second_lookup_within_ttl_hits_cache() {
        let (cache, geocoder) = cache_with(Outcome::Found, CacheSettings::default());
        let position = Some(Coordinates::new(40.0, -73.0));

        let first = cache.resolve(position).await;
        tokio::time::advance(Duration::from_secs(3599)).await;
        let second = cache.resolve(position).await;

        assert_eq!(first, second);
        assert_eq!(calls(&geocoder), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_after_ttl_calls_geocoder_again() {
        let (cache, geocoder) = cache_with(Outcome::Found, CacheSettings::default());
        let position = Some(Coordinates::new(40.0, -73.0));

        cache.resolve(position).await;
        tokio::time::advance(Duration::from_secs(3601)).await;
        cache.resolve(position).await;

        assert_eq!(calls(&geocoder), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_sentinels_and_not_cached() {
        let (cache, geocoder) = cache_with(Outcome::Empty, CacheSettings::default());
        let position = Some(Coordinates::new(1.0, 2.0));
        assert_eq!(cache.resolve(position).await, LOCATION_NOT_FOUND);
        assert_eq!(cache.resolve(position).await, LOCATION_NOT_FOUND);
        assert_eq!(calls(&geocoder), 2);
        assert!(cache.is_empty().await);

        let (cache, geocoder) = cache_with(Outcome::Fail, CacheSettings::default());
        assert_eq!(cache.resolve(position).await, UNABLE_TO_FETCH_ADDRESS);
        assert_eq!(calls(&geocoder), 1);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn missing_position_skips_geocoder() {
        let (cache, geocoder) = cache_with(Outcome::Found, CacheSettings::default());
        assert_eq!(cache.resolve(None).await, LOCATION_NOT_FOUND);
        assert_eq!(calls(&geocoder), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_misses_share_one_lookup() {
        let (cache, geocoder) = cache_with(Outcome::Found, CacheSettings::default());
        let position = Some(Coordinates::new(51.5, -0.12));

        let lookups = (0..8).map(|_| {
            let cache = cache.clone();
            tokio::spawn(async move { cache.resolve(position).await })
        });
        let mut addresses = Vec::new();
        for lookup in lookups {
            addresses.push(lookup.await.unwrap());
        }

        assert!(addresses.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(calls(&geocoder), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_cache_evicts_entry_closest_to_expiry() {
        let settings = CacheSettings {
            ttl: Duration::from_secs(60),
            max_entries: 2,
        };
        let (cache, geocoder) = cache_with(Outcome::Found, settings);
        let a = Some(Coordinates::new(1.0, 1.0));
        let b = Some(Coordinates::new(2.0, 2.0));
        let c = Some(Coordinates::new(3.0, 3.0));

        cache.resolve(a).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve(b).await;
        tokio::time::advance(Duration::from_secs(1)).await;
        cache.resolve(c).await;
        assert_eq!(cache.len().await, 2);
        assert_eq!(calls(&geocoder), 3);

        // b and c are still cached, a was evicted
        cache.resolve(b).await;
        cache.resolve(c).await;
        assert_eq!(calls(&geocoder), 3);
        cache.resolve(a).await;
        assert_eq!(calls(&geocoder), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_cache_drops_expired_entries_on_insert() {
        let settings = CacheSettings {
            ttl: Duration::from_secs(10),
            max_entries: 0,
        };
        let (cache, _) = cache_with(Outcome::Found, settings);
        for i in 0..100 {
            cache
                .resolve(Some(Coordinates::new(f64::from(i), 1.0)))
                .await;
        }
        assert_eq!(cache.len().await, 100);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.resolve(Some(Coordinates::new(-10.0, -10.0))).await;
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_lookup_releases_its_gate() {
        let (cache, geocoder) = cache_with(Outcome::Found, CacheSettings::default());
        let position = Some(Coordinates::new(48.85, 2.35));

        // the geocoder takes 10ms, so this gives up while holding the gate
        let timed_out =
            tokio::time::timeout(Duration::from_millis(1), cache.resolve(position)).await;
        assert!(timed_out.is_err());
        assert!(cache.inflight.lock().unwrap().is_empty());

        cache.resolve(position).await;
        assert_eq!(calls(&geocoder), 2);
        assert!(cache.inflight.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_expired_entries() {
        let settings = CacheSettings {
            ttl: Duration::from_secs(10),
            max_entries: 0,
        };
        let (cache, _) = cache_with(Outcome::Found, settings);
        cache.resolve(Some(Coordinates::new(1.0, 1.0))).await;
        assert_eq!(cache.len().await, 1);

        tokio::time::advance(Duration::from_secs(11)).await;
        cache.purge_expired().await;
        assert!(cache.is_empty().await);
    }
}
