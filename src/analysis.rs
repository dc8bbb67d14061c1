//! Analysis orchestration: one participant-day in, one itinerary out.
//!
//! Analyzing a single track is a pure, single-threaded computation; multiple
//! participant-days are independent and run in parallel under the `parallel`
//! feature. Per-track failures are surfaced as per-track results and never
//! abort the rest of a batch.

use crate::classify::classify_segment;
use crate::error::{ItineraryError, Result};
use crate::geocode::Geocoder;
use crate::loader::read_gpx_track;
use crate::network::RoadNetworkSet;
use crate::segments::build_segments;
use crate::stops::detect_stops;
use crate::{AnalysisConfig, ClassifiedSegment, Itinerary, Track};
use log::info;
use std::path::Path;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Analyze one track: detect stops, build and classify segments, attach
/// geocoded addresses, assemble the itinerary.
///
/// The road-network set may be empty (classification then relies on speed
/// alone) and the geocoder optional (stops then carry no address).
pub fn analyze_track(
    track: &Track,
    config: &AnalysisConfig,
    networks: &RoadNetworkSet,
    geocoder: Option<&Geocoder>,
) -> Result<Itinerary> {
    config.validate()?;
    // Re-validate caller input; `Track` construction already guarantees this
    // for tracks built through the loader.
    if track.len() < 2 {
        return Err(ItineraryError::EmptyTrack);
    }

    let mut stops = detect_stops(track, config);
    let segments = build_segments(track, &stops);

    let classified: Vec<ClassifiedSegment> = segments
        .into_iter()
        .map(|segment| {
            let decision = classify_segment(&segment, config, networks);
            ClassifiedSegment {
                segment,
                mode: decision.mode,
                confidence: decision.confidence,
            }
        })
        .collect();

    if let Some(geocoder) = geocoder {
        for stop in &mut stops {
            stop.address = geocoder.resolve(&stop.center);
        }
    }

    info!(
        "Analyzed track: {} points, {} stop(s), {} segment(s)",
        track.len(),
        stops.len(),
        classified.len()
    );

    Ok(Itinerary {
        stops,
        segments: classified,
    })
}

/// Analyze many participant-days. Outcomes are independent: one malformed
/// track yields one `Err` entry and leaves its neighbors untouched.
pub fn analyze_tracks(
    tracks: &[(String, Track)],
    config: &AnalysisConfig,
    networks: &RoadNetworkSet,
    geocoder: Option<&Geocoder>,
) -> Vec<(String, Result<Itinerary>)> {
    let analyze = |(id, track): &(String, Track)| {
        (
            id.clone(),
            analyze_track(track, config, networks, geocoder),
        )
    };

    #[cfg(feature = "parallel")]
    {
        tracks.par_iter().map(analyze).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        tracks.iter().map(analyze).collect()
    }
}

/// Load and analyze one GPX recording per participant-day. A file that fails
/// to load or validate produces a per-file error and the batch continues.
pub fn analyze_gpx_files<P: AsRef<Path> + Sync>(
    files: &[(String, P)],
    config: &AnalysisConfig,
    networks: &RoadNetworkSet,
    geocoder: Option<&Geocoder>,
) -> Vec<(String, Result<Itinerary>)> {
    let analyze = |(id, path): &(String, P)| {
        let outcome =
            read_gpx_track(path).and_then(|track| analyze_track(&track, config, networks, geocoder));
        (id.clone(), outcome)
    };

    #[cfg(feature = "parallel")]
    {
        files.par_iter().map(analyze).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        files.iter().map(analyze).collect()
    }
}
