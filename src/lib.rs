//! # Track Itinerary
//!
//! GPS track analysis: derive a structured itinerary (stops, travel segments
//! and transport modes) from one participant-day of timestamped positions.
//!
//! This library provides:
//! - Stop detection via temporal/spatial clustering of track points
//! - Segment construction with along-track distance and speed
//! - Transport-mode classification from speed bands, refined by optional
//!   road-network geometry
//! - A cached, rate-limited reverse-geocoding client for stop addresses
//!
//! ## Features
//!
//! - **`parallel`** - Analyze many participant-days in parallel with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::{Duration, TimeZone, Utc};
//! use track_itinerary::{analyze_track, AnalysisConfig, RoadNetworkSet, Track, TrackPoint};
//!
//! let start = Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap();
//! let mut points = Vec::new();
//!
//! // Five minutes standing still...
//! for i in 0..30 {
//!     points.push(TrackPoint::new(start + Duration::seconds(10 * i), 47.3769, 8.5417));
//! }
//! // ...ten minutes riding north at ~3.5 m/s...
//! for i in 0..60 {
//!     let lat = 47.3769 + (i + 1) as f64 * 0.000315;
//!     points.push(TrackPoint::new(start + Duration::seconds(290 + 10 * (i + 1)), lat, 8.5417));
//! }
//! // ...five minutes standing still again.
//! for i in 0..30 {
//!     let t = start + Duration::seconds(900 + 10 * i);
//!     points.push(TrackPoint::new(t, 47.3769 + 61.0 * 0.000315, 8.5417));
//! }
//!
//! let track = Track::from_points(points).unwrap();
//! let itinerary = analyze_track(
//!     &track,
//!     &AnalysisConfig::default(),
//!     &RoadNetworkSet::default(),
//!     None,
//! )
//! .unwrap();
//!
//! assert_eq!(itinerary.stops.len(), 2);
//! assert_eq!(itinerary.segments.len(), 1);
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{ItineraryError, Result};

// Geographic utilities (distance, bearing, point-to-polyline)
pub mod geo_utils;

// Track parsing and validation
pub mod loader;
pub use loader::{read_gpx_track, read_gpx_track_from, Track};

// Stop detection (stationary interval clustering)
pub mod stops;
pub use stops::detect_stops;

// Segment construction between stops
pub mod segments;
pub use segments::build_segments;

// Road-network spatial index (optional classifier evidence)
pub mod network;
pub use network::{RoadNetwork, RoadNetworkSet};

// Transport-mode classification
pub mod classify;
pub use classify::{classify_segment, ModeDecision};

// Reverse geocoding with caching and rate limiting
pub mod geocode;
pub use geocode::{Address, GeocodeConfig, Geocoder, NominatimClient, ReverseGeocode};

// Analysis orchestration (per participant-day)
pub mod analysis;
pub use analysis::{analyze_gpx_files, analyze_track, analyze_tracks};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// A timestamped position sample. Immutable once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    pub time: DateTime<Utc>,
    pub position: GpsPoint,
}

impl TrackPoint {
    /// Create a new track point.
    pub fn new(time: DateTime<Utc>, latitude: f64, longitude: f64) -> Self {
        Self {
            time,
            position: GpsPoint::new(latitude, longitude),
        }
    }
}

/// Transport mode assigned to a travel segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportMode {
    Walk,
    Bicycle,
    Car,
    Bus,
    Unknown,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportMode::Walk => "walk",
            TransportMode::Bicycle => "bicycle",
            TransportMode::Car => "car",
            TransportMode::Bus => "bus",
            TransportMode::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Speed range (m/s) in which a transport mode is a plausible candidate.
/// Bands of different modes may overlap; the overlap regions are where the
/// classifier consults road-network evidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedBand {
    pub mode: TransportMode,
    /// Lower bound in m/s (inclusive).
    pub min_speed: f64,
    /// Upper bound in m/s (inclusive).
    pub max_speed: f64,
}

impl SpeedBand {
    /// Create a new speed band.
    pub fn new(mode: TransportMode, min_speed: f64, max_speed: f64) -> Self {
        Self {
            mode,
            min_speed,
            max_speed,
        }
    }

    /// Whether a speed falls inside this band.
    pub fn contains(&self, speed: f64) -> bool {
        speed >= self.min_speed && speed <= self.max_speed
    }

    /// How central a speed sits in the band: 1.0 at the middle, 0.0 at the
    /// edges. Returns 0.0 for speeds outside the band.
    pub fn centrality(&self, speed: f64) -> f64 {
        if !self.contains(speed) {
            return 0.0;
        }
        let half_width = (self.max_speed - self.min_speed) / 2.0;
        if half_width <= 0.0 {
            return 1.0;
        }
        let mid = (self.min_speed + self.max_speed) / 2.0;
        1.0 - (speed - mid).abs() / half_width
    }
}

/// Configuration for one analysis run.
///
/// All thresholds are terrain/region dependent product-tuning inputs; the
/// defaults below are starting points, not ground truth. Construct once per
/// run and pass by reference; the core never reads ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Pairwise speed below which points count as stationary, in m/s.
    /// Default: 0.5 (well under walking pace, above GPS jitter).
    pub stop_speed_threshold: f64,

    /// Minimum duration of a stationary run to become a stop, in seconds.
    /// Default: 180.
    pub min_stop_duration: f64,

    /// Maximum gap between two stops that may be merged, in seconds.
    /// Default: 600.
    pub merge_max_gap: f64,

    /// Maximum center distance between two stops that may be merged, in
    /// meters. Default: 150.
    pub merge_distance: f64,

    /// Candidate speed bands per transport mode, in m/s.
    pub speed_bands: Vec<SpeedBand>,

    /// Maximum point-to-road deviation for a network to count as matching a
    /// segment, in meters. Default: 30.
    pub snap_distance: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            stop_speed_threshold: 0.5,
            min_stop_duration: 180.0,
            merge_max_gap: 600.0,
            merge_distance: 150.0,
            speed_bands: default_speed_bands(),
            snap_distance: 30.0,
        }
    }
}

impl AnalysisConfig {
    /// Check the configuration for values the analysis cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.stop_speed_threshold <= 0.0 || !self.stop_speed_threshold.is_finite() {
            return Err(ItineraryError::Config {
                message: format!(
                    "stop_speed_threshold must be positive, got {}",
                    self.stop_speed_threshold
                ),
            });
        }
        if self.min_stop_duration < 0.0 {
            return Err(ItineraryError::Config {
                message: format!(
                    "min_stop_duration must be non-negative, got {}",
                    self.min_stop_duration
                ),
            });
        }
        if self.snap_distance <= 0.0 {
            return Err(ItineraryError::Config {
                message: format!("snap_distance must be positive, got {}", self.snap_distance),
            });
        }
        if self.speed_bands.is_empty() {
            return Err(ItineraryError::Config {
                message: "speed_bands must not be empty".to_string(),
            });
        }
        for band in &self.speed_bands {
            if band.min_speed < 0.0 || band.max_speed < band.min_speed {
                return Err(ItineraryError::Config {
                    message: format!(
                        "invalid speed band for {}: {}..{} m/s",
                        band.mode, band.min_speed, band.max_speed
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Default candidate bands in m/s (shown in km/h for readability):
/// walk 0-7.2, bicycle 5.4-25, bus 14.4-68, car 20-130.
pub fn default_speed_bands() -> Vec<SpeedBand> {
    vec![
        SpeedBand::new(TransportMode::Walk, 0.0, 2.0),
        SpeedBand::new(TransportMode::Bicycle, 1.5, 7.0),
        SpeedBand::new(TransportMode::Bus, 4.0, 19.0),
        SpeedBand::new(TransportMode::Car, 5.5, 36.0),
    ]
}

/// A stationary interval: a run of track points that stayed below the stop
/// speed threshold for at least the minimum stop duration.
#[derive(Debug, Clone, Serialize)]
pub struct Stop {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Centroid of the member positions (absorbs GPS jitter).
    pub center: GpsPoint,
    /// Member positions, in time order.
    pub points: Vec<TrackPoint>,
    /// Resolved address, if geocoding was available.
    pub address: Option<Address>,
}

impl Stop {
    /// Stop duration in seconds, derived from the time range.
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// A travel interval between two stops (or a track boundary).
#[derive(Debug, Clone, Serialize)]
pub struct Segment {
    /// Index of the preceding stop in the itinerary; `None` at the track start.
    pub origin: Option<usize>,
    /// Index of the following stop; `None` at the track end.
    pub destination: Option<usize>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Interior positions strictly between the bounding stops, in time order.
    pub points: Vec<TrackPoint>,
    /// Along-track distance in meters, accumulated over consecutive points
    /// (never the straight-line origin-to-destination shortcut).
    pub distance: f64,
    /// Average speed in m/s. `None` for a degenerate zero-duration interval.
    pub average_speed: Option<f64>,
}

impl Segment {
    /// Segment duration in seconds, derived from the time range.
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// A segment together with its classification. Produced once per segment.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedSegment {
    #[serde(flatten)]
    pub segment: Segment,
    pub mode: TransportMode,
    /// Confidence indicator in [0, 1]; 0.0 for `Unknown`.
    pub confidence: f64,
}

/// The full ordered interleaving of stops and segments for one
/// participant-day. Built once per analysis run and rebuilt on re-analysis.
#[derive(Debug, Clone, Serialize, Default)]
pub struct Itinerary {
    pub stops: Vec<Stop>,
    pub segments: Vec<ClassifiedSegment>,
}

/// One entry in the chronological itinerary timeline.
#[derive(Debug, Clone, Copy)]
pub enum TimelineEntry<'a> {
    Stop(&'a Stop),
    Travel(&'a ClassifiedSegment),
}

impl Itinerary {
    /// Stops and segments interleaved in chronological order.
    pub fn timeline(&self) -> Vec<TimelineEntry<'_>> {
        let mut entries: Vec<TimelineEntry<'_>> = self
            .stops
            .iter()
            .map(TimelineEntry::Stop)
            .chain(self.segments.iter().map(TimelineEntry::Travel))
            .collect();
        entries.sort_by_key(|e| match e {
            TimelineEntry::Stop(s) => s.start,
            TimelineEntry::Travel(s) => s.segment.start,
        });
        entries
    }
}
