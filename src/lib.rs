//! Vehicle tracking on top of a per-frame object detector: stable ids,
//! distance to the closest vehicle in the ego lane and optical flow speed,
//! collected into per-track time series.

pub mod bbox;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod flow;
pub mod frame;
pub mod lane;
pub mod log;
pub mod matching;
pub mod pipeline;
pub mod speed;
pub mod tracker;

#[cfg(feature = "video")]
pub mod video;

mod circular_queue;
mod track;

pub use config::Config;
pub use detection::{Detection, VehicleClass};
pub use error::Error;
pub use frame::Frame;
pub use track::{Track, HISTORY_CAPACITY};
pub use tracker::{CentroidTracker, NativeTracker, Tracking};
