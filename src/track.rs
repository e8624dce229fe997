use nalgebra as na;

use crate::circular_queue::CircularQueue;
use crate::Detection;

/// Number of most recent centroids kept per track
pub const HISTORY_CAPACITY: usize = 30;

/// A vehicle identity carried across frames. Both estimators read the same
/// history, so there is exactly one bounded trail per id.
#[derive(Debug, Clone)]
pub struct Track {
    pub id: u32,
    pub detection: Detection,
    history: CircularQueue<na::Point2<f32>>,
}

impl Track {
    pub fn new(id: u32, detection: Detection) -> Self {
        let mut history = CircularQueue::with_capacity(HISTORY_CAPACITY);
        history.push(detection.centroid());

        Self {
            id,
            detection,
            history,
        }
    }

    /// Moves the track onto `detection`, extending its trail
    pub fn advance(mut self, detection: Detection) -> Self {
        self.history.push(detection.centroid());
        self.detection = detection;
        self
    }

    #[inline]
    pub fn centroid(&self) -> na::Point2<f32> {
        self.detection.centroid()
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.detection.width()
    }

    /// Latest recorded centroid
    #[inline]
    pub fn position(&self) -> na::Point2<f32> {
        self.history
            .latest()
            .copied()
            .unwrap_or_else(|| self.centroid())
    }

    /// Oldest to newest
    #[inline]
    pub fn history(&self) -> impl Iterator<Item = &na::Point2<f32>> {
        self.history.iter()
    }

    #[inline]
    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::VehicleClass;

    fn det_at(x: f32, y: f32) -> Detection {
        Detection::new(x - 5.0, y - 5.0, x + 5.0, y + 5.0, VehicleClass::Car)
    }

    #[test]
    fn history_is_capped_to_most_recent_points() {
        let mut track = Track::new(0, det_at(0.0, 0.0));

        for i in 1..40 {
            track = track.advance(det_at(i as f32, 100.0));
        }

        assert_eq!(track.history_len(), HISTORY_CAPACITY);

        let xs: Vec<f32> = track.history().map(|p| p.x).collect();
        let expected: Vec<f32> = (10..40).map(|i| i as f32).collect();
        assert_eq!(xs, expected);
        assert_eq!(track.position().x, 39.0);
    }

    #[test]
    fn new_track_starts_with_its_centroid() {
        let track = Track::new(3, det_at(12.0, 34.0));

        assert_eq!(track.history_len(), 1);
        assert_eq!(track.position(), na::Point2::new(12.0, 34.0));
    }
}
