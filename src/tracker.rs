use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::Error;
use crate::matching::{self, Matching};
use crate::{Frame, Track};

/// Produces stable ids from per-frame detections. Pipelines are written
/// against this trait only, so the id source can be swapped per pipeline.
pub trait Tracking {
    /// Replaces the active set with this frame's tracks, returning the ids
    /// that disappeared
    fn update(&mut self, frame: &Frame) -> Result<Vec<u32>, Error>;

    /// Tracks alive after the last update
    fn tracks(&self) -> &[Track];
}

/// Self-built identities: nearest-centroid matching against the previous frame
#[derive(Debug)]
pub struct CentroidTracker {
    tracks: Vec<Track>,
    next_id: u32,
    max_distance: f32,
    matching: Matching,
}

impl CentroidTracker {
    pub fn new(max_distance: f32, matching: Matching) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 0,
            max_distance,
            matching,
        }
    }

    #[inline]
    pub fn next_id(&self) -> u32 {
        self.next_id
    }
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self::new(50.0, Matching::Greedy)
    }
}

impl Tracking for CentroidTracker {
    fn update(&mut self, frame: &Frame) -> Result<Vec<u32>, Error> {
        let previous = std::mem::take(&mut self.tracks);
        let out = matching::assign(
            &frame.detections,
            previous,
            self.next_id,
            self.max_distance,
            self.matching,
        );

        self.tracks = out.tracks;
        self.next_id = out.next_id;

        Ok(out.evicted)
    }

    #[inline]
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

/// Identities taken verbatim from the detector
#[derive(Debug, Default)]
pub struct NativeTracker {
    tracks: Vec<Track>,
}

impl NativeTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Tracking for NativeTracker {
    fn update(&mut self, frame: &Frame) -> Result<Vec<u32>, Error> {
        let mut previous = std::mem::take(&mut self.tracks);
        let mut seen = HashSet::with_capacity(frame.len());

        for det in frame.iter() {
            let id = match det.native_id {
                Some(id) => id,
                None => {
                    warn!("frame {}: detection without native id skipped", frame.index);
                    continue;
                }
            };

            if !seen.insert(id) {
                warn!("frame {}: duplicate native id {} ignored", frame.index, id);
                continue;
            }

            let track = match previous.iter().position(|t| t.id == id) {
                Some(idx) => previous.swap_remove(idx).advance(*det),
                None => Track::new(id, *det),
            };

            self.tracks.push(track);
        }

        let evicted: Vec<u32> = previous.into_iter().map(|t| t.id).collect();

        debug!(
            "frame {}: {} native tracks, {} evicted",
            frame.index,
            self.tracks.len(),
            evicted.len()
        );

        Ok(evicted)
    }

    #[inline]
    fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}
