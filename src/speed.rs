use std::collections::BTreeMap;

use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Error;
use crate::flow::{DenseFlow, FarnebackParams, FlowField};
use crate::Track;

const MS_TO_KMH: f32 = 3.6;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SpeedConfig {
    /// Two points of the detection line, defaults to a horizontal line
    /// across the frame at 60% of its height
    pub region: Option<[[f32; 2]; 2]>,
    /// Half height of the band around the line, in pixels
    pub dist_threshold: f32,
    /// Meters per pixel
    pub scale_factor: f32,
    /// Records kept per track in the session log
    pub max_records: usize,
    pub flow: FarnebackParams,
}

impl Default for SpeedConfig {
    fn default() -> Self {
        Self {
            region: None,
            dist_threshold: 10.0,
            scale_factor: 0.1,
            max_records: 8,
            flow: FarnebackParams::default(),
        }
    }
}

/// Horizontal band where flow is sampled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionLine {
    pub start: na::Point2<f32>,
    pub end: na::Point2<f32>,
    pub dist_threshold: f32,
}

impl DetectionLine {
    pub fn new(start: na::Point2<f32>, end: na::Point2<f32>, dist_threshold: f32) -> Self {
        Self {
            start,
            end,
            dist_threshold,
        }
    }

    pub fn for_frame(dims: (u32, u32), config: &SpeedConfig) -> Self {
        let (w, h) = dims;

        let (start, end) = match config.region {
            Some([[x0, y0], [x1, y1]]) => (na::Point2::new(x0, y0), na::Point2::new(x1, y1)),
            None => {
                let y = (h as f32 * 0.6).trunc();
                (na::Point2::new(0.0, y), na::Point2::new(w as f32, y))
            }
        };

        Self::new(start, end, config.dist_threshold)
    }

    /// Strictly inside `(start.x, end.x)` and within the threshold of the line
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (x as f32, y as f32);

        self.start.x < x
            && x < self.end.x
            && self.end.y - self.dist_threshold < y
            && y < self.end.y + self.dist_threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedSample {
    pub track_id: u32,
    pub speed_kmh: f32,
}

/// `pixels/frame -> km/h`
#[inline]
pub fn speed_kmh(magnitude: f32, frame_rate: f32, scale_factor: f32) -> f32 {
    magnitude * frame_rate * scale_factor * MS_TO_KMH
}

#[derive(Debug)]
enum FlowState<I> {
    Uninitialized,
    Ready { prev: I },
}

/// Samples optical flow where tracks cross the detection line. The first
/// frame only primes the reference image; every later frame computes flow
/// against the previous one.
pub struct SpeedEstimator<F: DenseFlow> {
    flow: F,
    line: DetectionLine,
    frame_rate: f32,
    scale_factor: f32,
    state: FlowState<F::Image>,
    speeds: BTreeMap<u32, f32>,
}

impl<F: DenseFlow> SpeedEstimator<F> {
    pub fn new(flow: F, line: DetectionLine, frame_rate: f32, scale_factor: f32) -> Self {
        Self {
            flow,
            line,
            frame_rate,
            scale_factor,
            state: FlowState::Uninitialized,
            speeds: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, FlowState::Ready { .. })
    }

    #[inline]
    pub fn line(&self) -> &DetectionLine {
        &self.line
    }

    /// Latest speed of every live track that has crossed the line
    #[inline]
    pub fn speeds(&self) -> &BTreeMap<u32, f32> {
        &self.speeds
    }

    #[inline]
    pub fn speed(&self, id: u32) -> Option<f32> {
        self.speeds.get(&id).copied()
    }

    /// Forgets speeds of tracks that are no longer alive
    pub fn prune(&mut self, evicted: &[u32]) {
        for id in evicted {
            if self.speeds.remove(id).is_some() {
                debug!("speed of track {} dropped", id);
            }
        }
    }

    fn sample(&self, track: &Track, field: &FlowField) -> Option<f32> {
        let pos = track.position();
        let (x, y) = (pos.x as i32, pos.y as i32);

        if !self.line.contains(x, y) {
            return None;
        }

        let magnitude = field.magnitude_at(x, y)?;

        Some(speed_kmh(magnitude, self.frame_rate, self.scale_factor))
    }

    /// Feeds the next grayscale frame with the tracks found on it. Returns
    /// the samples taken on this frame; each overwrites the stored speed.
    pub fn update(
        &mut self,
        gray: F::Image,
        tracks: &[Track],
        evicted: &[u32],
    ) -> Result<Vec<SpeedSample>, Error> {
        self.prune(evicted);

        let field = match &self.state {
            FlowState::Ready { prev } => Some(self.flow.compute(prev, &gray)?),
            FlowState::Uninitialized => None,
        };

        let mut samples = Vec::new();

        if let Some(field) = field {
            for track in tracks {
                if let Some(speed_kmh) = self.sample(track, &field) {
                    samples.push(SpeedSample {
                        track_id: track.id,
                        speed_kmh,
                    });
                }
            }
        }

        for s in &samples {
            debug!("track {} crossed the line at {:.2} km/h", s.track_id, s.speed_kmh);
            self.speeds.insert(s.track_id, s.speed_kmh);
        }

        self.state = FlowState::Ready { prev: gray };

        Ok(samples)
    }
}
