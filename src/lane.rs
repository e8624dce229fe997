use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::Track;

/// Typical passenger car width, used as the implicit calibration target
pub const AVERAGE_CAR_WIDTH_METERS: f32 = 1.8;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LaneConfig {
    pub reference_meters: f32,
    /// Defaults to a third of the frame width
    pub lane_width: Option<f32>,
    /// Defaults to the bottom-center of the frame
    pub source_point: Option<[f32; 2]>,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            reference_meters: AVERAGE_CAR_WIDTH_METERS,
            lane_width: None,
            source_point: None,
        }
    }
}

/// Ego lane as seen from the camera: where distances are measured from and
/// how wide the band of candidate vehicles is
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LaneGeometry {
    pub source: na::Point2<f32>,
    pub lane_width: f32,
    pub reference_meters: f32,
}

impl LaneGeometry {
    pub fn for_frame(dims: (u32, u32), config: &LaneConfig) -> Self {
        let (w, h) = dims;

        let source = match config.source_point {
            Some([x, y]) => na::Point2::new(x, y),
            None => na::Point2::new((w / 2) as f32, h as f32),
        };

        Self {
            source,
            lane_width: config.lane_width.unwrap_or((w / 3) as f32),
            reference_meters: config.reference_meters,
        }
    }

    #[inline]
    pub fn contains(&self, track: &Track) -> bool {
        is_same_lane(track, self.source, self.lane_width)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Closest {
    pub id: u32,
    pub centroid: na::Point2<f32>,
    pub pixels: f32,
    pub meters: f32,
}

#[inline]
pub fn is_same_lane(track: &Track, source: na::Point2<f32>, lane_width: f32) -> bool {
    (track.centroid().x - source.x).abs() <= lane_width / 2.0
}

/// Nearest in-lane track by centroid distance from `source`. A distance of
/// exactly zero never qualifies. Returns `(None, inf)` when nothing does.
pub fn find_closest_in_lane<'a>(
    tracks: &'a [Track],
    source: na::Point2<f32>,
    lane_width: f32,
) -> (Option<&'a Track>, f32) {
    let mut closest = None;
    let mut min_distance = f32::INFINITY;

    for track in tracks {
        if !is_same_lane(track, source, lane_width) {
            continue;
        }

        let distance = na::distance(&source, &track.centroid());
        if distance < min_distance && distance > 0.0 {
            min_distance = distance;
            closest = Some(track);
        }
    }

    (closest, min_distance)
}

/// Converts pixels to meters given an object of known size; zero reference
/// width has no defined ratio and yields infinity
#[inline]
pub fn to_meters(pixels: f32, reference_pixels: f32, reference_meters: f32) -> f32 {
    if reference_pixels != 0.0 {
        pixels / reference_pixels * reference_meters
    } else {
        f32::INFINITY
    }
}

/// Closest in-lane vehicle with its distance calibrated by its own width
pub fn estimate(tracks: &[Track], lane: &LaneGeometry) -> Option<Closest> {
    let (track, pixels) = find_closest_in_lane(tracks, lane.source, lane.lane_width);
    let track = track?;

    Some(Closest {
        id: track.id,
        centroid: track.centroid(),
        pixels,
        meters: to_meters(pixels, track.width(), lane.reference_meters),
    })
}
