//! Transport-mode classification.
//!
//! Two-stage decision: average speed maps into overlapping candidate bands
//! (always available, cheap), then road-network geometry breaks ties between
//! candidates (optional supplementary evidence, never a hard override of an
//! unambiguous speed band). Classification never fails: inconclusive evidence
//! degrades to [`TransportMode::Unknown`].

use crate::network::RoadNetworkSet;
use crate::{AnalysisConfig, GpsPoint, Segment, SpeedBand, TransportMode};
use log::debug;

/// A classification decision for one segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeDecision {
    pub mode: TransportMode,
    /// Confidence indicator in [0, 1]; 0.0 for `Unknown`.
    pub confidence: f64,
}

impl ModeDecision {
    fn unknown() -> Self {
        Self {
            mode: TransportMode::Unknown,
            confidence: 0.0,
        }
    }
}

/// Classify one segment. Deterministic: the same segment, configuration and
/// networks always produce the same decision.
pub fn classify_segment(
    segment: &Segment,
    config: &AnalysisConfig,
    networks: &RoadNetworkSet,
) -> ModeDecision {
    let speed = match segment.average_speed {
        Some(speed) => speed,
        // Degenerate zero-duration segment: no speed evidence at all.
        None => return ModeDecision::unknown(),
    };

    let candidates: Vec<&SpeedBand> = config
        .speed_bands
        .iter()
        .filter(|band| band.contains(speed))
        .collect();

    match candidates.len() {
        0 => {
            debug!("No speed band covers {:.1} m/s", speed);
            ModeDecision::unknown()
        }
        1 => ModeDecision {
            mode: candidates[0].mode,
            confidence: 0.5 + 0.5 * candidates[0].centrality(speed),
        },
        _ => break_tie(segment, speed, &candidates, config, networks),
    }
}

/// Stage 2: prefer the candidate whose road network the segment hugs most
/// closely (smallest maximum deviation under the snap distance); without
/// usable geometry, fall back to the band the speed sits most centrally in.
fn break_tie(
    segment: &Segment,
    speed: f64,
    candidates: &[&SpeedBand],
    config: &AnalysisConfig,
    networks: &RoadNetworkSet,
) -> ModeDecision {
    let positions: Vec<GpsPoint> = segment.points.iter().map(|p| p.position).collect();

    let mut best_spatial: Option<(TransportMode, f64)> = None;
    if !positions.is_empty() {
        for band in candidates {
            let deviation = networks
                .get(band.mode)
                .and_then(|network| network.max_deviation(&positions));
            if let Some(deviation) = deviation {
                if deviation <= config.snap_distance
                    && best_spatial.map_or(true, |(_, best)| deviation < best)
                {
                    best_spatial = Some((band.mode, deviation));
                }
            }
        }
    }

    if let Some((mode, deviation)) = best_spatial {
        debug!(
            "Spatial tie-break: {} (max deviation {:.1} m)",
            mode, deviation
        );
        return ModeDecision {
            mode,
            confidence: 0.5 + 0.5 * (1.0 - deviation / config.snap_distance),
        };
    }

    // Speed-only fallback: highest band centrality wins, exact ties stay
    // unknown.
    let mut best: Option<(TransportMode, f64)> = None;
    let mut tied = false;
    for band in candidates {
        let score = band.centrality(speed);
        match best {
            Some((_, best_score)) if (score - best_score).abs() < 1e-9 => tied = true,
            Some((_, best_score)) if score > best_score => {
                best = Some((band.mode, score));
                tied = false;
            }
            None => best = Some((band.mode, score)),
            _ => {}
        }
    }

    match best {
        Some((mode, score)) if !tied => ModeDecision {
            mode,
            confidence: 0.5 * score,
        },
        _ => ModeDecision::unknown(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::RoadNetwork;
    use crate::TrackPoint;
    use chrono::{DateTime, TimeZone, Utc};
    use geo::{Coord, LineString};

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    /// Straight northbound segment along longitude `lng` with the requested
    /// average speed.
    fn segment_at(speed: f64, lng: f64) -> Segment {
        let duration = 600.0;
        let points: Vec<TrackPoint> = (0..=60)
            .map(|i| {
                let lat = 47.0 + speed * (i as f64 * 10.0) / 111_195.0;
                TrackPoint::new(t(i * 10), lat, lng)
            })
            .collect();
        Segment {
            origin: Some(0),
            destination: Some(1),
            start: points[0].time,
            end: points[points.len() - 1].time,
            distance: speed * duration,
            average_speed: Some(speed),
            points,
        }
    }

    fn car_network_along(lng: f64) -> RoadNetworkSet {
        let line = LineString::new(vec![
            Coord { x: lng, y: 46.9 },
            Coord { x: lng, y: 47.2 },
        ]);
        let mut set = RoadNetworkSet::new();
        set.insert(TransportMode::Car, RoadNetwork::from_linestrings(&[line]));
        set
    }

    #[test]
    fn test_walking_speed_is_walk() {
        let decision = classify_segment(
            &segment_at(1.0, 8.0),
            &AnalysisConfig::default(),
            &RoadNetworkSet::new(),
        );
        assert_eq!(decision.mode, TransportMode::Walk);
        assert!(decision.confidence > 0.5);
    }

    #[test]
    fn test_cycling_speed_is_bicycle() {
        let decision = classify_segment(
            &segment_at(3.5, 8.0),
            &AnalysisConfig::default(),
            &RoadNetworkSet::new(),
        );
        assert_eq!(decision.mode, TransportMode::Bicycle);
    }

    #[test]
    fn test_overlap_without_networks_falls_back_to_centrality() {
        // 6.0 m/s sits in the bicycle, bus and car bands; it is most central
        // in the bicycle band.
        let decision = classify_segment(
            &segment_at(6.0, 8.0),
            &AnalysisConfig::default(),
            &RoadNetworkSet::new(),
        );
        assert_eq!(decision.mode, TransportMode::Bicycle);
        assert!(decision.confidence <= 0.5);
    }

    #[test]
    fn test_overlap_with_matching_car_network_is_car() {
        // Same ambiguous speed, but a car network runs under every point.
        let decision = classify_segment(
            &segment_at(6.0, 8.0),
            &AnalysisConfig::default(),
            &car_network_along(8.0),
        );
        assert_eq!(decision.mode, TransportMode::Car);
        assert!(decision.confidence > 0.9);
    }

    #[test]
    fn test_network_beyond_snap_distance_is_ignored() {
        // Car network ~750 m away: outside the 30 m snap tolerance.
        let decision = classify_segment(
            &segment_at(6.0, 8.0),
            &AnalysisConfig::default(),
            &car_network_along(8.01),
        );
        assert_eq!(decision.mode, TransportMode::Bicycle);
    }

    #[test]
    fn test_network_never_overrides_unambiguous_band() {
        // 1.0 m/s is squarely walking; the car network must not win.
        let decision = classify_segment(
            &segment_at(1.0, 8.0),
            &AnalysisConfig::default(),
            &car_network_along(8.0),
        );
        assert_eq!(decision.mode, TransportMode::Walk);
    }

    #[test]
    fn test_degenerate_segment_is_unknown() {
        let mut segment = segment_at(3.0, 8.0);
        segment.average_speed = None;
        let decision = classify_segment(
            &segment,
            &AnalysisConfig::default(),
            &RoadNetworkSet::new(),
        );
        assert_eq!(decision.mode, TransportMode::Unknown);
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_speed_above_every_band_is_unknown() {
        let decision = classify_segment(
            &segment_at(60.0, 8.0),
            &AnalysisConfig::default(),
            &RoadNetworkSet::new(),
        );
        assert_eq!(decision.mode, TransportMode::Unknown);
    }

    #[test]
    fn test_exactly_tied_bands_stay_unknown() {
        let config = AnalysisConfig {
            speed_bands: vec![
                SpeedBand::new(TransportMode::Walk, 0.0, 4.0),
                SpeedBand::new(TransportMode::Bicycle, 0.0, 4.0),
            ],
            ..AnalysisConfig::default()
        };
        let decision = classify_segment(&segment_at(2.0, 8.0), &config, &RoadNetworkSet::new());
        assert_eq!(decision.mode, TransportMode::Unknown);
    }

    #[test]
    fn test_deterministic() {
        let segment = segment_at(6.0, 8.0);
        let config = AnalysisConfig::default();
        let networks = car_network_along(8.0);

        let first = classify_segment(&segment, &config, &networks);
        for _ in 0..10 {
            assert_eq!(classify_segment(&segment, &config, &networks), first);
        }
    }
}
