use lanetrack::detector::Detect;
use lanetrack::flow::{DenseFlow, FlowField};
use lanetrack::lane::LaneGeometry;
use lanetrack::pipeline::{
    self, DistanceFrame, DistancePipeline, FrameSink, FrameSource, SpeedFrame, SpeedPipeline,
};
use lanetrack::speed::DetectionLine;
use lanetrack::{Config, Detection, Error, Frame, NativeTracker, VehicleClass};

struct Synthetic {
    dims: (u32, u32),
    fps: f32,
    frames: usize,
    fail_at: Option<usize>,
    read: usize,
}

impl Synthetic {
    fn new(dims: (u32, u32), fps: f32, frames: usize) -> Self {
        Self {
            dims,
            fps,
            frames,
            fail_at: None,
            read: 0,
        }
    }
}

impl FrameSource for Synthetic {
    type Image = ();

    fn dims(&self) -> (u32, u32) {
        self.dims
    }

    fn fps(&self) -> f32 {
        self.fps
    }

    fn read(&mut self) -> Result<Option<()>, Error> {
        if Some(self.read) == self.fail_at {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "corrupted frame",
            )));
        }

        if self.read >= self.frames {
            return Ok(None);
        }

        self.read += 1;
        Ok(Some(()))
    }
}

struct Scripted(Vec<Vec<Detection>>);

impl Detect<()> for Scripted {
    fn detect(&mut self, frame_index: u64, _image: &()) -> Result<Vec<Detection>, Error> {
        self.0
            .get(frame_index as usize)
            .cloned()
            .ok_or_else(|| Error::Detector(format!("no detections for frame {}", frame_index)))
    }
}

#[derive(Default)]
struct Recorder {
    written: usize,
    released: usize,
}

impl FrameSink<()> for Recorder {
    fn write(&mut self, _image: &()) -> Result<(), Error> {
        self.written += 1;
        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        self.released += 1;
        Ok(())
    }
}

struct ConstantFlow(f32, f32);

impl DenseFlow for ConstantFlow {
    type Image = ();

    fn compute(&mut self, _prev: &(), _next: &()) -> Result<FlowField, Error> {
        Ok(FlowField::uniform(640, 480, self.0, self.1))
    }
}

fn car(cx: f32, cy: f32) -> Detection {
    Detection::new(cx - 10.0, cy - 10.0, cx + 10.0, cy + 10.0, VehicleClass::Car)
}

fn no_distance_marks(_: &mut (), _: &DistanceFrame<'_>, _: &LaneGeometry) -> Result<(), Error> {
    Ok(())
}

fn no_speed_marks(_: &mut (), _: &SpeedFrame<'_>, _: &DetectionLine) -> Result<(), Error> {
    Ok(())
}

#[test]
fn single_vehicle_produces_one_series() {
    let mut source = Synthetic::new((240, 240), 20.0, 3);
    let mut detector = Scripted(vec![
        vec![car(100.0, 120.0)],
        vec![car(110.0, 120.0)],
        vec![car(120.0, 120.0)],
    ]);
    let mut sink = Recorder::default();

    let log = pipeline::run_distance(
        &mut source,
        &mut detector,
        &mut sink,
        &Config::default(),
        no_distance_marks,
    )
    .unwrap();

    assert_eq!(sink.written, 3);
    assert_eq!(sink.released, 1);

    let json: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
    let series = json.as_object().unwrap();
    assert_eq!(series.len(), 1);

    let records = series["0"].as_array().unwrap();
    let timestamps: Vec<&str> = records
        .iter()
        .map(|r| r["timestamp"].as_str().unwrap())
        .collect();
    assert_eq!(timestamps, vec!["0.00 seconds", "0.05 seconds", "0.10 seconds"]);
    assert!(records
        .iter()
        .all(|r| r["distance"].as_str().unwrap().ends_with(" meters")));
}

#[test]
fn read_failure_finishes_the_session() {
    let mut source = Synthetic::new((240, 240), 20.0, 5);
    source.fail_at = Some(2);
    let mut detector = Scripted(vec![vec![car(100.0, 120.0)]; 5]);
    let mut sink = Recorder::default();

    let log = pipeline::run_distance(
        &mut source,
        &mut detector,
        &mut sink,
        &Config::default(),
        no_distance_marks,
    )
    .unwrap();

    assert_eq!(sink.written, 2);
    assert_eq!(sink.released, 1);
    assert_eq!(log.get(0).map(|r| r.len()), Some(2));
}

#[test]
fn detector_failure_aborts_the_session() {
    let mut source = Synthetic::new((240, 240), 20.0, 3);
    let mut detector = Scripted(vec![vec![car(100.0, 120.0)]]);
    let mut sink = Recorder::default();

    let res = pipeline::run_distance(
        &mut source,
        &mut detector,
        &mut sink,
        &Config::default(),
        no_distance_marks,
    );

    assert!(matches!(res, Err(Error::Detector(_))));
    assert_eq!(sink.written, 1);
    assert_eq!(sink.released, 1);
}

#[test]
fn detector_failure_releases_the_speed_sink() {
    let mut source = Synthetic::new((640, 480), 20.0, 3);
    let mut detector = Scripted(vec![vec![car(320.0, 288.0).with_native_id(1)]]);
    let mut sink = Recorder::default();

    let res = pipeline::run_speed(
        &mut source,
        &mut detector,
        &mut sink,
        ConstantFlow(1.0, 0.0),
        &Config::default(),
        |_| Ok(()),
        no_speed_marks,
    );

    assert!(matches!(res, Err(Error::Detector(_))));
    assert_eq!(sink.written, 1);
    assert_eq!(sink.released, 1);
}

#[test]
fn annotation_failure_releases_the_sink() {
    let mut source = Synthetic::new((240, 240), 20.0, 3);
    let mut detector = Scripted(vec![vec![car(100.0, 120.0)]; 3]);
    let mut sink = Recorder::default();

    let res = pipeline::run_distance(
        &mut source,
        &mut detector,
        &mut sink,
        &Config::default(),
        |_, _, _| Err(Error::Detector("drawing failed".into())),
    );

    assert!(res.is_err());
    assert_eq!(sink.written, 0);
    assert_eq!(sink.released, 1);
}

#[test]
fn distance_pipeline_accepts_native_ids() {
    let config = Config::default();
    let lane = LaneGeometry::for_frame((240, 240), &config.lane);
    let mut pipeline = DistancePipeline::new(NativeTracker::new(), lane);

    for (i, x) in [100.0, 110.0].iter().enumerate() {
        let frame = Frame::new(i as u64, 20.0, (240, 240), vec![car(*x, 120.0).with_native_id(42)]);
        let out = pipeline.process(&frame).unwrap();
        assert_eq!(out.closest.map(|c| c.id), Some(42));
    }

    assert_eq!(pipeline.log().ids().collect::<Vec<_>>(), vec![42]);
}

#[test]
fn only_line_crossing_vehicles_get_speeds() {
    let config = Config::default();
    let mut pipeline = SpeedPipeline::from_config(ConstantFlow(3.0, 4.0), (640, 480), 20.0, &config);

    // vehicle 1 drives down through the line at y=288 on frame 2,
    // vehicle 2 stays far above it
    let ys = [200.0, 240.0, 285.0, 330.0, 380.0];

    for (i, y) in ys.iter().enumerate() {
        let frame = Frame::new(
            i as u64,
            20.0,
            (640, 480),
            vec![
                car(320.0, *y).with_native_id(1),
                car(100.0, 100.0).with_native_id(2),
            ],
        );

        let out = pipeline.process(&frame, ()).unwrap();

        if i < 2 {
            assert!(out.speeds.is_empty());
        } else {
            assert!((out.speeds[&1] - 36.0).abs() < 1e-4);
        }
        assert!(!out.speeds.contains_key(&2));
        assert_eq!(out.samples.len(), usize::from(i == 2));
    }

    let log = pipeline.log();
    assert_eq!(log.ids().collect::<Vec<_>>(), vec![1]);

    let timestamps: Vec<f32> = log.get(1).unwrap().iter().map(|r| r.timestamp).collect();
    assert_eq!(timestamps.len(), 3);
    assert!((timestamps[0] - 0.10).abs() < 1e-6);
}

#[test]
fn speed_log_is_capped_per_vehicle() {
    let mut source = Synthetic::new((640, 480), 20.0, 12);
    let mut detector = Scripted(vec![vec![car(320.0, 288.0).with_native_id(5)]; 12]);
    let mut sink = Recorder::default();

    let log = pipeline::run_speed(
        &mut source,
        &mut detector,
        &mut sink,
        ConstantFlow(0.0, 2.0),
        &Config::default(),
        |_| Ok(()),
        no_speed_marks,
    )
    .unwrap();

    assert_eq!(sink.written, 12);
    assert_eq!(sink.released, 1);

    let records = log.get(5).unwrap();
    assert_eq!(records.len(), 8);
    // frame 0 has no flow yet, so the first record comes from frame 1
    assert!((records[0].timestamp - 0.05).abs() < 1e-6);
    assert!((records[7].timestamp - 0.40).abs() < 1e-6);
}

#[test]
fn vanished_vehicle_stops_being_logged() {
    let config = Config::default();
    let mut pipeline = SpeedPipeline::from_config(ConstantFlow(1.0, 0.0), (640, 480), 20.0, &config);

    let present = vec![car(320.0, 288.0).with_native_id(9)];
    for i in 0..3u64 {
        pipeline
            .process(&Frame::new(i, 20.0, (640, 480), present.clone()), ())
            .unwrap();
    }

    for i in 3..6u64 {
        let out = pipeline
            .process(&Frame::new(i, 20.0, (640, 480), Vec::new()), ())
            .unwrap();
        assert!(out.speeds.is_empty());
    }

    assert_eq!(pipeline.log().get(9).map(|r| r.len()), Some(2));
}
