//! Track parsing and validation.
//!
//! A [`Track`] is the validated input to the whole analysis: at least two
//! points, strictly increasing timestamps, coordinates inside valid ranges.
//! The loader never interpolates or resamples; downstream code must tolerate
//! irregular sampling intervals.

use crate::error::{ItineraryError, Result};
use crate::TrackPoint;
use chrono::{DateTime, Utc};
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// An ordered sequence of timestamped positions for one participant-day.
/// Consumed read-only downstream.
#[derive(Debug, Clone)]
pub struct Track {
    points: Vec<TrackPoint>,
}

impl Track {
    /// Build a track from raw samples, validating the loader contract.
    ///
    /// Fails with [`ItineraryError::MalformedTrack`] if fewer than 2 points,
    /// if any timestamp does not strictly increase, or if a coordinate is
    /// outside valid latitude/longitude ranges.
    pub fn from_points(points: Vec<TrackPoint>) -> Result<Self> {
        if points.len() < 2 {
            return Err(ItineraryError::MalformedTrack {
                message: format!("{} point(s), minimum 2 required", points.len()),
            });
        }

        for (i, p) in points.iter().enumerate() {
            if !p.position.is_valid() {
                return Err(ItineraryError::MalformedTrack {
                    message: format!(
                        "point {} has invalid coordinates ({}, {})",
                        i, p.position.latitude, p.position.longitude
                    ),
                });
            }
        }

        for (i, w) in points.windows(2).enumerate() {
            if w[1].time <= w[0].time {
                return Err(ItineraryError::MalformedTrack {
                    message: format!(
                        "timestamp at point {} ({}) does not strictly increase over point {} ({})",
                        i + 1,
                        w[1].time,
                        i,
                        w[0].time
                    ),
                });
            }
        }

        Ok(Self { points })
    }

    /// The validated samples, in time order.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    /// Number of samples (always >= 2).
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always false for a validated track; present for slice-like ergonomics.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Timestamp of the first sample.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.points[0].time
    }

    /// Timestamp of the last sample.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.points[self.points.len() - 1].time
    }
}

/// Read a track from a GPX file.
///
/// All tracks and track segments in the file are flattened into one sequence;
/// points without a timestamp are skipped. Points are sorted by time before
/// validation, so an unordered file is tolerated while duplicate timestamps
/// are not.
pub fn read_gpx_track<P: AsRef<Path>>(path: P) -> Result<Track> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| ItineraryError::MalformedTrack {
        message: format!("cannot open {}: {}", path.display(), e),
    })?;
    let track = read_gpx_track_from(BufReader::new(file))?;
    debug!("Loaded {} points from {}", track.len(), path.display());
    Ok(track)
}

/// Read a track from any GPX reader. See [`read_gpx_track`].
pub fn read_gpx_track_from<R: Read>(reader: R) -> Result<Track> {
    let gpx = gpx::read(reader).map_err(|e| ItineraryError::MalformedTrack {
        message: format!("GPX parse error: {}", e),
    })?;

    let mut points = Vec::new();
    for trk in &gpx.tracks {
        for seg in &trk.segments {
            for pt in &seg.points {
                let time = match &pt.time {
                    Some(time) => time,
                    None => continue,
                };
                let formatted = time.format().map_err(|e| ItineraryError::MalformedTrack {
                    message: format!("unreadable point time: {}", e),
                })?;
                let parsed = DateTime::parse_from_rfc3339(&formatted).map_err(|e| {
                    ItineraryError::MalformedTrack {
                        message: format!("invalid point time '{}': {}", formatted, e),
                    }
                })?;
                let point = pt.point();
                points.push(TrackPoint::new(
                    parsed.with_timezone(&Utc),
                    point.y(),
                    point.x(),
                ));
            }
        }
    }

    points.sort_by_key(|p| p.time);
    Track::from_points(points)
}
