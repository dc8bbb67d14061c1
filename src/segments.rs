//! Segment construction: the moving intervals between stops.
//!
//! Each segment carries the along-track distance (accumulated over
//! consecutive points, from the origin stop's last member to the destination
//! stop's first member), the interval duration and the average speed. The
//! ordered interior positions are retained so the classifier can consult
//! spatial shape, not just the scalar average.

use crate::geo_utils::polyline_length;
use crate::{GpsPoint, Segment, Stop, Track, TrackPoint};
use chrono::{DateTime, Utc};
use log::warn;

/// Average speed in m/s, or `None` for a degenerate zero-duration interval.
/// Degenerate intervals are recovered as unknown-speed segments, never as a
/// division failure.
pub(crate) fn average_speed(distance: f64, duration_secs: f64) -> Option<f64> {
    if duration_secs > 0.0 {
        Some(distance / duration_secs)
    } else {
        None
    }
}

/// Build the travel segments of a track from its detected stops.
///
/// Stops and segments together tile the track's full time range: every
/// moving interval bounded by two stops (or a track boundary) becomes one
/// segment. A track without stops yields a single segment spanning the whole
/// recording, with synthetic boundaries (`origin`/`destination` = `None`).
pub fn build_segments(track: &Track, stops: &[Stop]) -> Vec<Segment> {
    let points = track.points();

    if stops.is_empty() {
        return vec![make_segment(points, 0, points.len() - 1, None, None)];
    }

    let mut segments = Vec::new();

    // Leading moving interval before the first stop.
    if stops[0].start > points[0].time {
        let end_idx = index_of(points, stops[0].start);
        segments.push(make_segment(points, 0, end_idx, None, Some(0)));
    }

    // Intervals between consecutive stops. Distinct stops are always
    // separated by at least one moving pair, so the interval is never empty.
    for k in 0..stops.len() - 1 {
        let start_idx = index_of(points, stops[k].end);
        let end_idx = index_of(points, stops[k + 1].start);
        segments.push(make_segment(points, start_idx, end_idx, Some(k), Some(k + 1)));
    }

    // Trailing moving interval after the last stop.
    let last = stops.len() - 1;
    if stops[last].end < points[points.len() - 1].time {
        let start_idx = index_of(points, stops[last].end);
        segments.push(make_segment(
            points,
            start_idx,
            points.len() - 1,
            Some(last),
            None,
        ));
    }

    segments
}

/// Index of the track point carrying a stop boundary timestamp. Stop
/// boundaries are member timestamps, so the lookup always succeeds on a
/// track the stops were detected from.
fn index_of(points: &[TrackPoint], time: DateTime<Utc>) -> usize {
    points
        .binary_search_by_key(&time, |p| p.time)
        .unwrap_or_else(|insertion| {
            warn!("Stop boundary {} is not a track point", time);
            insertion.min(points.len() - 1)
        })
}

fn make_segment(
    points: &[TrackPoint],
    chain_start: usize,
    chain_end: usize,
    origin: Option<usize>,
    destination: Option<usize>,
) -> Segment {
    let chain = &points[chain_start..=chain_end];
    let positions: Vec<GpsPoint> = chain.iter().map(|p| p.position).collect();
    let distance = polyline_length(&positions);

    let start = chain[0].time;
    let end = chain[chain.len() - 1].time;
    let duration = (end - start).num_milliseconds() as f64 / 1000.0;

    // Interior positions exclude stop members; a chain endpoint stays in only
    // when that side is a track boundary.
    let from = if origin.is_some() { 1 } else { 0 };
    let to = if destination.is_some() {
        chain.len().saturating_sub(1)
    } else {
        chain.len()
    };
    let interior = if from < to {
        chain[from..to].to_vec()
    } else {
        Vec::new()
    };

    Segment {
        origin,
        destination,
        start,
        end,
        points: interior,
        distance,
        average_speed: average_speed(distance, duration),
    }
}
