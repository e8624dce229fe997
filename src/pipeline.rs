use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detector::Detect;
use crate::error::Error;
use crate::flow::DenseFlow;
use crate::lane::{self, Closest, LaneGeometry};
use crate::log::{DistanceLog, SpeedLog};
use crate::speed::{DetectionLine, SpeedEstimator, SpeedSample};
use crate::tracker::{CentroidTracker, NativeTracker, Tracking};
use crate::{Frame, Track};

/// Where frames come from. `Ok(None)` marks the end of the stream.
pub trait FrameSource {
    type Image;

    fn dims(&self) -> (u32, u32);
    fn fps(&self) -> f32;
    fn read(&mut self) -> Result<Option<Self::Image>, Error>;
}

/// Where annotated frames go. `release` may be called more than once but
/// only the first call has an effect.
pub trait FrameSink<I> {
    fn write(&mut self, image: &I) -> Result<(), Error>;
    fn release(&mut self) -> Result<(), Error>;
}

pub struct DistanceFrame<'a> {
    pub tracks: &'a [Track],
    pub closest: Option<Closest>,
}

/// Distance to the closest vehicle ahead, per frame
pub struct DistancePipeline<T: Tracking = CentroidTracker> {
    tracker: T,
    lane: LaneGeometry,
    log: DistanceLog,
}

impl DistancePipeline<CentroidTracker> {
    pub fn from_config(dims: (u32, u32), config: &Config) -> Self {
        let tracker = CentroidTracker::new(config.tracker.max_distance, config.tracker.matching);

        Self::new(tracker, LaneGeometry::for_frame(dims, &config.lane))
    }
}

impl<T: Tracking> DistancePipeline<T> {
    pub fn new(tracker: T, lane: LaneGeometry) -> Self {
        Self {
            tracker,
            lane,
            log: DistanceLog::default(),
        }
    }

    pub fn process(&mut self, frame: &Frame) -> Result<DistanceFrame<'_>, Error> {
        self.tracker.update(frame)?;

        let tracks = self.tracker.tracks();
        let closest = lane::estimate(tracks, &self.lane);

        if let Some(c) = &closest {
            debug!(
                "time {:.2}s: closest car {} at {:.2} m",
                frame.timestamp, c.id, c.meters
            );
            self.log.push(c.id, frame.timestamp, c.meters);
        }

        Ok(DistanceFrame { tracks, closest })
    }

    #[inline]
    pub fn lane(&self) -> &LaneGeometry {
        &self.lane
    }

    #[inline]
    pub fn log(&self) -> &DistanceLog {
        &self.log
    }

    #[inline]
    pub fn into_log(self) -> DistanceLog {
        self.log
    }
}

pub struct SpeedFrame<'a> {
    pub tracks: &'a [Track],
    pub speeds: &'a BTreeMap<u32, f32>,
    pub samples: Vec<SpeedSample>,
}

/// Speed of every vehicle crossing the detection line
pub struct SpeedPipeline<F: DenseFlow, T: Tracking = NativeTracker> {
    tracker: T,
    estimator: SpeedEstimator<F>,
    log: SpeedLog,
}

impl<F: DenseFlow> SpeedPipeline<F, NativeTracker> {
    pub fn from_config(flow: F, dims: (u32, u32), fps: f32, config: &Config) -> Self {
        let line = DetectionLine::for_frame(dims, &config.speed);
        let estimator = SpeedEstimator::new(flow, line, fps, config.speed.scale_factor);

        Self::new(NativeTracker::new(), estimator, config.speed.max_records)
    }
}

impl<F: DenseFlow, T: Tracking> SpeedPipeline<F, T> {
    pub fn new(tracker: T, estimator: SpeedEstimator<F>, max_records: usize) -> Self {
        Self {
            tracker,
            estimator,
            log: SpeedLog::capped(max_records),
        }
    }

    pub fn process(&mut self, frame: &Frame, gray: F::Image) -> Result<SpeedFrame<'_>, Error> {
        let evicted = self.tracker.update(frame)?;
        let samples = self
            .estimator
            .update(gray, self.tracker.tracks(), &evicted)?;

        for (&id, &speed) in self.estimator.speeds() {
            self.log.push(id, frame.timestamp, speed);
        }

        Ok(SpeedFrame {
            tracks: self.tracker.tracks(),
            speeds: self.estimator.speeds(),
            samples,
        })
    }

    #[inline]
    pub fn line(&self) -> &DetectionLine {
        self.estimator.line()
    }

    #[inline]
    pub fn estimator(&self) -> &SpeedEstimator<F> {
        &self.estimator
    }

    #[inline]
    pub fn log(&self) -> &SpeedLog {
        &self.log
    }

    #[inline]
    pub fn into_log(self) -> SpeedLog {
        self.log
    }
}

/// Pulls the next frame, a failed read ends the stream like EOF does
fn next_image<S: FrameSource>(source: &mut S, index: u64) -> Option<S::Image> {
    match source.read() {
        Ok(image) => image,
        Err(err) => {
            warn!("frame {}: read failed, finishing: {}", index, err);
            None
        }
    }
}

/// Runs the distance pipeline until the source is exhausted. The sink is
/// released exactly once, whether the loop finishes or fails.
pub fn run_distance<S, D, W, A>(
    source: &mut S,
    detector: &mut D,
    sink: &mut W,
    config: &Config,
    annotate: A,
) -> Result<DistanceLog, Error>
where
    S: FrameSource,
    D: Detect<S::Image>,
    W: FrameSink<S::Image>,
    A: FnMut(&mut S::Image, &DistanceFrame<'_>, &LaneGeometry) -> Result<(), Error>,
{
    let res = distance_loop(source, detector, sink, config, annotate);

    finish::<S::Image, _, _>(sink, res)
}

fn distance_loop<S, D, W, A>(
    source: &mut S,
    detector: &mut D,
    sink: &mut W,
    config: &Config,
    mut annotate: A,
) -> Result<DistanceLog, Error>
where
    S: FrameSource,
    D: Detect<S::Image>,
    W: FrameSink<S::Image>,
    A: FnMut(&mut S::Image, &DistanceFrame<'_>, &LaneGeometry) -> Result<(), Error>,
{
    let dims = source.dims();
    let fps = source.fps();
    let mut pipeline = DistancePipeline::from_config(dims, config);
    let mut index = 0u64;

    info!("distance session started: {}x{} @ {:.1} fps", dims.0, dims.1, fps);

    while let Some(mut image) = next_image(source, index) {
        let detections = detector.detect(index, &image)?;
        let frame = Frame::new(index, fps, dims, detections);

        let lane = *pipeline.lane();
        let out = pipeline.process(&frame)?;
        annotate(&mut image, &out, &lane)?;
        sink.write(&image)?;

        index += 1;
    }

    info!("distance session finished after {} frames", index);

    Ok(pipeline.into_log())
}

/// Runs the speed pipeline until the source is exhausted, `to_gray` turns
/// each frame into the image the flow estimator works on. The sink is
/// released exactly once, whether the loop finishes or fails.
pub fn run_speed<S, D, W, F, G, A>(
    source: &mut S,
    detector: &mut D,
    sink: &mut W,
    flow: F,
    config: &Config,
    to_gray: G,
    annotate: A,
) -> Result<SpeedLog, Error>
where
    S: FrameSource,
    D: Detect<S::Image>,
    W: FrameSink<S::Image>,
    F: DenseFlow,
    G: FnMut(&S::Image) -> Result<F::Image, Error>,
    A: FnMut(&mut S::Image, &SpeedFrame<'_>, &DetectionLine) -> Result<(), Error>,
{
    let res = speed_loop(source, detector, sink, flow, config, to_gray, annotate);

    finish::<S::Image, _, _>(sink, res)
}

fn speed_loop<S, D, W, F, G, A>(
    source: &mut S,
    detector: &mut D,
    sink: &mut W,
    flow: F,
    config: &Config,
    mut to_gray: G,
    mut annotate: A,
) -> Result<SpeedLog, Error>
where
    S: FrameSource,
    D: Detect<S::Image>,
    W: FrameSink<S::Image>,
    F: DenseFlow,
    G: FnMut(&S::Image) -> Result<F::Image, Error>,
    A: FnMut(&mut S::Image, &SpeedFrame<'_>, &DetectionLine) -> Result<(), Error>,
{
    let dims = source.dims();
    let fps = source.fps();
    let mut pipeline = SpeedPipeline::from_config(flow, dims, fps, config);
    let mut index = 0u64;

    info!("speed session started: {}x{} @ {:.1} fps", dims.0, dims.1, fps);

    while let Some(mut image) = next_image(source, index) {
        let detections = detector.detect(index, &image)?;
        let frame = Frame::new(index, fps, dims, detections);
        let gray = to_gray(&image)?;

        let line = *pipeline.line();
        let out = pipeline.process(&frame, gray)?;
        annotate(&mut image, &out, &line)?;
        sink.write(&image)?;

        index += 1;
    }

    info!("speed session finished after {} frames", index);

    Ok(pipeline.into_log())
}

/// Releases the sink after the frame loop. A loop error wins over a release
/// error, which is then only logged.
fn finish<I, W: FrameSink<I>, T>(sink: &mut W, res: Result<T, Error>) -> Result<T, Error> {
    match (res, sink.release()) {
        (Ok(out), Ok(())) => Ok(out),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            warn!("sink release failed after an aborted session: {}", release_err);
            Err(err)
        }
    }
}
