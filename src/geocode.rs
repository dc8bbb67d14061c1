//! Reverse geocoding with caching, courtesy rate limiting and bounded retry.
//!
//! The raw lookup is a small, mockable trait ([`ReverseGeocode`]); the
//! [`Geocoder`] wraps any implementation with:
//! - a cache keyed by rounded coordinates (nearby stops resolve once)
//! - a minimum inter-request interval (courtesy policy of the public
//!   Nominatim service)
//! - bounded retry with exponential backoff on transient failures
//!
//! Lookup exhaustion degrades to a missing address; it never aborts an
//! analysis. The contract towards the orchestrator is synchronous regardless
//! of these mechanics.

use crate::error::{ItineraryError, Result};
use crate::GpsPoint;
use log::{debug, warn};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// A resolved stop address. Fields the lookup could not fill stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,
    pub road: String,
    pub house_number: String,
    pub postcode: String,
    pub city: String,
}

impl Address {
    /// Whether the lookup produced nothing usable.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
            && self.road.is_empty()
            && self.house_number.is_empty()
            && self.postcode.is_empty()
            && self.city.is_empty()
    }
}

/// The raw lookup seam. Implementations should stay simple; caching, rate
/// limiting and retry belong to the [`Geocoder`] wrapper.
pub trait ReverseGeocode: Send + Sync {
    fn lookup(&self, point: &GpsPoint) -> Result<Address>;
}

/// Configuration for the geocoding client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    /// Reverse-geocoding endpoint. Default: the public Nominatim instance.
    pub endpoint: String,
    /// User-Agent sent with every request (required by Nominatim's policy).
    pub user_agent: String,
    /// Per-request timeout in seconds. Default: 5.
    pub timeout_secs: u64,
    /// Minimum interval between outbound requests in milliseconds.
    /// Default: 1000 (Nominatim courtesy policy).
    pub min_request_interval_ms: u64,
    /// Retries after a failed lookup before giving up. Default: 3.
    pub max_retries: u32,
    /// First retry backoff in milliseconds; doubles per retry. Default: 500.
    pub initial_backoff_ms: u64,
    /// Decimal places of the cache key. Default: 5 (~1 m), so stops at the
    /// same place share one lookup.
    pub cache_precision: u32,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://nominatim.openstreetmap.org/reverse".to_string(),
            user_agent: "track-itinerary/0.1 (contact@example.com)".to_string(),
            timeout_secs: 5,
            min_request_interval_ms: 1000,
            max_retries: 3,
            initial_backoff_ms: 500,
            cache_precision: 5,
        }
    }
}

// ============================================================================
// Nominatim client (raw lookup)
// ============================================================================

/// Reverse-geocoding client for a Nominatim-compatible endpoint.
pub struct NominatimClient {
    client: Client,
    endpoint: String,
    user_agent: String,
}

#[derive(Debug, Deserialize)]
struct NominatimResponse {
    name: Option<String>,
    #[serde(default)]
    address: NominatimAddress,
}

#[derive(Debug, Default, Deserialize)]
struct NominatimAddress {
    amenity: Option<String>,
    attraction: Option<String>,
    leisure: Option<String>,
    shop: Option<String>,
    tourism: Option<String>,
    road: Option<String>,
    pedestrian: Option<String>,
    footway: Option<String>,
    house_number: Option<String>,
    postcode: Option<String>,
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
}

impl NominatimClient {
    /// Create a new client from configuration.
    pub fn new(config: &GeocodeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ItineraryError::GeocodingUnavailable {
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            user_agent: config.user_agent.clone(),
        })
    }
}

impl ReverseGeocode for NominatimClient {
    fn lookup(&self, point: &GpsPoint) -> Result<Address> {
        let response = self
            .client
            .get(&self.endpoint)
            .header("User-Agent", &self.user_agent)
            .query(&[
                ("format", "jsonv2".to_string()),
                ("lat", point.latitude.to_string()),
                ("lon", point.longitude.to_string()),
                ("zoom", "18".to_string()),
                ("addressdetails", "1".to_string()),
            ])
            .send()
            .map_err(|e| ItineraryError::GeocodingUnavailable {
                message: format!("request error: {}", e),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ItineraryError::GeocodingUnavailable {
                message: format!("HTTP {}", status),
            });
        }

        let body: NominatimResponse =
            response
                .json()
                .map_err(|e| ItineraryError::GeocodingUnavailable {
                    message: format!("parse error: {}", e),
                })?;
        Ok(extract_address(body))
    }
}

/// Map a Nominatim response onto our address fields, with the usual fallback
/// chains (a place name may hide in an amenity tag, a footpath has no road).
fn extract_address(response: NominatimResponse) -> Address {
    let addr = response.address;
    let name = response
        .name
        .filter(|n| !n.is_empty())
        .or(addr.amenity)
        .or(addr.attraction)
        .or(addr.leisure)
        .or(addr.shop)
        .or(addr.tourism)
        .unwrap_or_default();
    Address {
        name,
        road: addr
            .road
            .or(addr.pedestrian)
            .or(addr.footway)
            .unwrap_or_default(),
        house_number: addr.house_number.unwrap_or_default(),
        postcode: addr.postcode.unwrap_or_default(),
        city: addr
            .city
            .or(addr.town)
            .or(addr.village)
            .or(addr.hamlet)
            .unwrap_or_default(),
    }
}

// ============================================================================
// Geocoder (caching + rate limiting + retry wrapper)
// ============================================================================

struct GeocoderState {
    cache: HashMap<(i64, i64), Option<Address>>,
    last_request: Option<Instant>,
}

/// Decorator around a raw [`ReverseGeocode`] lookup. Outbound requests are
/// serialized (the state lock is held across the call), so sharing one
/// `Geocoder` between parallel analyses respects the courtesy interval.
pub struct Geocoder {
    inner: Box<dyn ReverseGeocode>,
    config: GeocodeConfig,
    state: Mutex<GeocoderState>,
}

impl Geocoder {
    /// Wrap a raw lookup implementation.
    pub fn new(inner: Box<dyn ReverseGeocode>, config: GeocodeConfig) -> Self {
        Self {
            inner,
            config,
            state: Mutex::new(GeocoderState {
                cache: HashMap::new(),
                last_request: None,
            }),
        }
    }

    /// Convenience constructor wrapping a [`NominatimClient`].
    pub fn nominatim(config: GeocodeConfig) -> Result<Self> {
        let client = NominatimClient::new(&config)?;
        Ok(Self::new(Box::new(client), config))
    }

    /// Resolve a coordinate to an address. Returns `None` when the lookup
    /// exhausted its retries; the caller proceeds with a missing address.
    pub fn resolve(&self, point: &GpsPoint) -> Option<Address> {
        let key = self.cache_key(point);
        let mut state = self.lock_state();

        if let Some(cached) = state.cache.get(&key) {
            debug!("[Geocoder] Cache hit for {:?}", key);
            return cached.clone();
        }

        let result = self.lookup_with_retry(&mut state, point);
        state.cache.insert(key, result.clone());
        result
    }

    fn lock_state(&self) -> MutexGuard<'_, GeocoderState> {
        // A poisoned lock only means another analysis panicked; the cache and
        // timestamps inside are still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_key(&self, point: &GpsPoint) -> (i64, i64) {
        let scale = 10_f64.powi(self.config.cache_precision as i32);
        (
            (point.latitude * scale).round() as i64,
            (point.longitude * scale).round() as i64,
        )
    }

    fn lookup_with_retry(
        &self,
        state: &mut GeocoderState,
        point: &GpsPoint,
    ) -> Option<Address> {
        let mut backoff = Duration::from_millis(self.config.initial_backoff_ms);

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                thread::sleep(backoff);
                backoff *= 2;
            }
            self.wait_for_interval(state);

            let result = self.inner.lookup(point);
            state.last_request = Some(Instant::now());

            match result {
                Ok(address) => {
                    debug!(
                        "[Geocoder] Resolved ({:.5}, {:.5}) on attempt {}",
                        point.latitude,
                        point.longitude,
                        attempt + 1
                    );
                    return Some(address);
                }
                Err(e) => {
                    warn!(
                        "[Geocoder] Lookup failed for ({:.5}, {:.5}), attempt {}/{}: {}",
                        point.latitude,
                        point.longitude,
                        attempt + 1,
                        self.config.max_retries + 1,
                        e
                    );
                }
            }
        }

        warn!(
            "[Geocoder] Giving up on ({:.5}, {:.5}); proceeding without address",
            point.latitude, point.longitude
        );
        None
    }

    fn wait_for_interval(&self, state: &mut GeocoderState) {
        let interval = Duration::from_millis(self.config.min_request_interval_ms);
        if let Some(last) = state.last_request {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
    }
}
