//! Stop detection: partition a track into stationary and moving intervals.
//!
//! A stop is a maximal run of consecutive points whose pairwise speed stays
//! below the configured threshold for at least the minimum stop duration.
//! Detected stops are then merged when a short gap separates two stops whose
//! centers lie within the merge radius (brief GPS wander around one place,
//! e.g. walking across a courtyard, should not split an errand in two).

use crate::geo_utils::{centroid, haversine_distance};
use crate::{AnalysisConfig, GpsPoint, Stop, Track, TrackPoint};
use log::debug;

/// Instantaneous speed between two adjacent samples in m/s.
pub(crate) fn pairwise_speed(a: &TrackPoint, b: &TrackPoint) -> f64 {
    let dt = (b.time - a.time).num_milliseconds() as f64 / 1000.0;
    if dt <= 0.0 {
        return 0.0;
    }
    haversine_distance(&a.position, &b.position) / dt
}

/// Detect the stationary intervals of a track.
///
/// Deterministic and idempotent: the same track and configuration always
/// yield the same stops. A track that never drops below the threshold yields
/// no stops; a track entirely below it yields a single stop spanning the
/// whole recording.
pub fn detect_stops(track: &Track, config: &AnalysisConfig) -> Vec<Stop> {
    let points = track.points();
    let mut raw: Vec<Stop> = Vec::new();
    let mut run_start: Option<usize> = None;

    for i in 0..points.len() - 1 {
        let stationary = pairwise_speed(&points[i], &points[i + 1]) < config.stop_speed_threshold;
        if stationary {
            run_start.get_or_insert(i);
        } else if let Some(start) = run_start.take() {
            // Run covers points[start..=i].
            push_stop(&mut raw, &points[start..=i], config);
        }
    }
    if let Some(start) = run_start {
        push_stop(&mut raw, &points[start..], config);
    }

    let merged = merge_stops(raw, config);
    debug!(
        "Detected {} stop(s) over {} points",
        merged.len(),
        points.len()
    );
    merged
}

fn push_stop(stops: &mut Vec<Stop>, members: &[TrackPoint], config: &AnalysisConfig) {
    let duration = (members[members.len() - 1].time - members[0].time).num_milliseconds() as f64
        / 1000.0;
    if duration < config.min_stop_duration {
        return;
    }
    if let Some(center) = member_centroid(members) {
        stops.push(Stop {
            start: members[0].time,
            end: members[members.len() - 1].time,
            center,
            points: members.to_vec(),
            address: None,
        });
    }
}

fn member_centroid(members: &[TrackPoint]) -> Option<GpsPoint> {
    let positions: Vec<GpsPoint> = members.iter().map(|p| p.position).collect();
    centroid(&positions)
}

/// Merge consecutive stops separated by at most `merge_max_gap` seconds whose
/// centers lie within `merge_distance` meters.
fn merge_stops(stops: Vec<Stop>, config: &AnalysisConfig) -> Vec<Stop> {
    let mut merged: Vec<Stop> = Vec::with_capacity(stops.len());

    for stop in stops {
        let absorb = match merged.last() {
            Some(prev) => {
                let gap = (stop.start - prev.end).num_milliseconds() as f64 / 1000.0;
                gap <= config.merge_max_gap
                    && haversine_distance(&prev.center, &stop.center) <= config.merge_distance
            }
            None => false,
        };

        if absorb {
            let prev = merged.last_mut().unwrap();
            prev.end = stop.end;
            prev.points.extend(stop.points);
            if let Some(center) = member_centroid(&prev.points) {
                prev.center = center;
            }
        } else {
            merged.push(stop);
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// ~1.112 m of latitude.
    const LAT_METER: f64 = 0.00001;

    fn stationary_cluster(points: &mut Vec<TrackPoint>, lat: f64, from: i64, to: i64) {
        let mut secs = from;
        while secs <= to {
            points.push(TrackPoint::new(t(secs), lat, 8.0));
            secs += 10;
        }
    }

    fn traverse(points: &mut Vec<TrackPoint>, from_lat: f64, from: i64, to: i64, speed: f64) {
        // Steps of 10 s, moving north at `speed` m/s.
        let mut secs = from;
        let mut lat = from_lat;
        while secs <= to {
            lat += speed * 10.0 * LAT_METER / 1.112;
            points.push(TrackPoint::new(t(secs), lat, 8.0));
            secs += 10;
        }
    }

    fn track(points: Vec<TrackPoint>) -> Track {
        Track::from_points(points).unwrap()
    }

    #[test]
    fn test_fully_stationary_track_is_one_stop() {
        let mut points = Vec::new();
        stationary_cluster(&mut points, 47.0, 0, 300);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].start, track.start_time());
        assert_eq!(stops[0].end, track.end_time());
        assert!((stops[0].center.latitude - 47.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_moving_track_has_no_stops() {
        let mut points = vec![TrackPoint::new(t(0), 47.0, 8.0)];
        traverse(&mut points, 47.0, 10, 600, 4.0);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert!(stops.is_empty());
    }

    #[test]
    fn test_two_clusters_with_traverse() {
        let mut points = Vec::new();
        stationary_cluster(&mut points, 47.0, 0, 300);
        traverse(&mut points, 47.0, 310, 900, 4.0);
        let far_lat = points.last().unwrap().position.latitude;
        stationary_cluster(&mut points, far_lat, 910, 1210);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert_eq!(stops.len(), 2);
        assert!(stops[0].end <= stops[1].start);
    }

    #[test]
    fn test_short_pause_is_not_a_stop() {
        let mut points = Vec::new();
        traverse(&mut points, 47.0, 0, 300, 4.0);
        let lat = points.last().unwrap().position.latitude;
        // 60 s pause, below the 180 s minimum.
        stationary_cluster(&mut points, lat, 310, 360);
        traverse(&mut points, lat, 370, 700, 4.0);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert!(stops.is_empty());
    }

    #[test]
    fn test_idempotent() {
        let mut points = Vec::new();
        stationary_cluster(&mut points, 47.0, 0, 240);
        traverse(&mut points, 47.0, 250, 600, 3.0);
        let lat = points.last().unwrap().position.latitude;
        stationary_cluster(&mut points, lat, 610, 900);
        let track = track(points);

        let config = AnalysisConfig::default();
        let first = detect_stops(&track, &config);
        let second = detect_stops(&track, &config);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert_eq!(a.start, b.start);
            assert_eq!(a.end, b.end);
            assert_eq!(a.center, b.center);
        }
    }

    #[test]
    fn test_nearby_stops_are_merged() {
        let mut points = Vec::new();
        stationary_cluster(&mut points, 47.0, 0, 240);
        // A 30 s dash of ~60 m splits the run but not the place.
        traverse(&mut points, 47.0, 250, 270, 2.0);
        let lat = points.last().unwrap().position.latitude;
        stationary_cluster(&mut points, lat, 280, 520);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert_eq!(stops.len(), 1);
        assert_eq!(stops[0].start, t(0));
        assert_eq!(stops[0].end, t(520));
    }

    #[test]
    fn test_distant_stops_are_not_merged() {
        let mut points = Vec::new();
        stationary_cluster(&mut points, 47.0, 0, 240);
        // ~2 km away: outside the default 150 m merge radius.
        traverse(&mut points, 47.0, 250, 750, 4.0);
        let lat = points.last().unwrap().position.latitude;
        stationary_cluster(&mut points, lat, 760, 1000);
        let track = track(points);

        let stops = detect_stops(&track, &AnalysisConfig::default());
        assert_eq!(stops.len(), 2);
    }
}
