use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};
use tracing::debug;

use crate::detection::{Detection, VehicleClass};
use crate::error::Error;

/// COCO ids of car, bus and truck
pub const VEHICLE_CLASSES: [i32; 3] = [2, 5, 7];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub classes: Vec<i32>,
    pub confidence_threshold: f32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            classes: VEHICLE_CLASSES.to_vec(),
            confidence_threshold: 0.0,
        }
    }
}

/// Detector output as it comes off the model
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    #[serde(rename = "p", default = "full_confidence")]
    pub confidence: f32,
    #[serde(rename = "c")]
    pub class: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

fn full_confidence() -> f32 {
    1.0
}

/// Boundary to the object detector: one call per frame, vehicles only
pub trait Detect<I: ?Sized> {
    fn detect(&mut self, frame_index: u64, image: &I) -> Result<Vec<Detection>, Error>;
}

/// Keeps confident vehicle detections with a non degenerate box
pub fn filter(raw: &[RawDetection], config: &DetectorConfig) -> Vec<Detection> {
    raw.iter()
        .filter(|r| config.classes.contains(&r.class))
        .filter(|r| r.confidence >= config.confidence_threshold)
        .filter_map(|r| {
            let class = VehicleClass::from_coco(r.class)?;
            let det = Detection::new(r.x1, r.y1, r.x2, r.y2, class);

            if !det.bbox.is_valid() {
                return None;
            }

            Some(match r.id {
                Some(id) => det.with_native_id(id),
                None => det,
            })
        })
        .collect()
}

/// Parses `<frame index>:<json array of detections>`
pub fn parse_line(line: &str) -> Result<(u64, Vec<RawDetection>), Error> {
    let idx = line
        .find(':')
        .ok_or_else(|| Error::Detector("wrong file format: expected `:`".into()))?;
    let (index, vector) = line.split_at(idx);

    let index = index
        .trim()
        .parse::<u64>()
        .map_err(|e| Error::Detector(format!("wrong file format: frame index: {}", e)))?;
    let detections = serde_json::from_str(&vector[1..])?;

    Ok((index, detections))
}

/// Precomputed detections, one line per frame in frame order
pub struct DetectionsFile<R: BufRead> {
    lines: std::io::Lines<R>,
    config: DetectorConfig,
}

impl DetectionsFile<BufReader<File>> {
    pub fn open<P: AsRef<Path>>(path: P, config: DetectorConfig) -> Result<Self, Error> {
        let file = File::open(path)?;

        Ok(Self::from_reader(BufReader::new(file), config))
    }
}

impl<R: BufRead> DetectionsFile<R> {
    pub fn from_reader(reader: R, config: DetectorConfig) -> Self {
        Self {
            lines: reader.lines(),
            config,
        }
    }

    fn next_line(&mut self) -> Result<Option<String>, Error> {
        for line in self.lines.by_ref() {
            let line = line?;
            if !line.trim().is_empty() {
                return Ok(Some(line));
            }
        }

        Ok(None)
    }
}

impl<R: BufRead, I: ?Sized> Detect<I> for DetectionsFile<R> {
    fn detect(&mut self, frame_index: u64, _image: &I) -> Result<Vec<Detection>, Error> {
        let line = self
            .next_line()?
            .ok_or_else(|| Error::Detector(format!("no detections for frame {}", frame_index)))?;

        let (index, raw) = parse_line(&line)?;
        if index != frame_index {
            return Err(Error::Detector(format!(
                "detections are for frame {}, expected {}",
                index, frame_index
            )));
        }

        let detections = filter(&raw, &self.config);
        debug!(
            "frame {}: {} of {} detections kept",
            frame_index,
            detections.len(),
            raw.len()
        );

        Ok(detections)
    }
}
