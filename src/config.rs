use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::lane::LaneConfig;
use crate::matching::Matching;
use crate::speed::SpeedConfig;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Largest centroid jump, in pixels, still treated as the same vehicle
    pub max_distance: f32,
    pub matching: Matching,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 50.0,
            matching: Matching::Greedy,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub lane: LaneConfig,
    pub speed: SpeedConfig,
    pub detector: DetectorConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let contents = std::fs::read_to_string(path)?;

        Self::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let config = Config::from_yaml(
            "
tracker:
  matching: optimal
speed:
  region: [[20, 400], [1260, 400]]
  scale_factor: 0.05
",
        )
        .unwrap();

        assert_eq!(config.tracker.matching, Matching::Optimal);
        assert_eq!(config.tracker.max_distance, 50.0);
        assert_eq!(config.speed.region, Some([[20.0, 400.0], [1260.0, 400.0]]));
        assert_eq!(config.speed.scale_factor, 0.05);
        assert_eq!(config.speed.dist_threshold, 10.0);
        assert_eq!(config.speed.max_records, 8);
        assert_eq!(config.lane, LaneConfig::default());
        assert_eq!(config.detector.classes, vec![2, 5, 7]);
    }

    #[test]
    fn unknown_matching_is_rejected() {
        assert!(Config::from_yaml("tracker:\n  matching: hungarian\n").is_err());
    }
}
