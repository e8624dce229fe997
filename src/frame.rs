use crate::detection::Detection;

pub struct Frame {
    pub index: u64,
    pub dims: (u32, u32),
    pub detections: Vec<Detection>,
    pub timestamp: f32, // in seconds
}

impl Frame {
    /// Timestamp is derived from the frame position: `index / fps`
    pub fn new(index: u64, fps: f32, dims: (u32, u32), detections: Vec<Detection>) -> Self {
        let timestamp = if fps > 0.0 { index as f32 / fps } else { 0.0 };

        Self {
            index,
            dims,
            detections,
            timestamp,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.dims.0
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.dims.1
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}
