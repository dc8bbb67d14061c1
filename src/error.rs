//! Unified error handling for the track-itinerary library.
//!
//! Failures are always local to one participant-day: a malformed or empty
//! track aborts that single analysis, never a whole batch. Classification and
//! geocoding degrade (to `Unknown` mode / missing address) instead of erroring.

use std::fmt;

/// Unified error type for track-itinerary operations.
#[derive(Debug, Clone)]
pub enum ItineraryError {
    /// Track input is unusable: fewer than two points, non-increasing
    /// timestamps, or coordinates outside valid ranges.
    MalformedTrack { message: String },
    /// Caller supplied nothing to analyze.
    EmptyTrack,
    /// A route-geometry file could not be read or parsed.
    GeometryLoad { message: String },
    /// A reverse-geocoding lookup failed (network error, bad status,
    /// unparseable response). The `Geocoder` wrapper retries and then
    /// recovers this to a missing address.
    GeocodingUnavailable { message: String },
    /// Invalid analysis configuration (e.g. an empty speed-band table).
    Config { message: String },
}

impl fmt::Display for ItineraryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItineraryError::MalformedTrack { message } => {
                write!(f, "Malformed track: {}", message)
            }
            ItineraryError::EmptyTrack => {
                write!(f, "Empty track: nothing to analyze")
            }
            ItineraryError::GeometryLoad { message } => {
                write!(f, "Route geometry load failed: {}", message)
            }
            ItineraryError::GeocodingUnavailable { message } => {
                write!(f, "Geocoding unavailable: {}", message)
            }
            ItineraryError::Config { message } => {
                write!(f, "Configuration error: {}", message)
            }
        }
    }
}

impl std::error::Error for ItineraryError {}

/// Result type alias for track-itinerary operations.
pub type Result<T> = std::result::Result<T, ItineraryError>;
