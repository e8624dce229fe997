use std::path::Path;

use opencv::{
    core::{self, Mat},
    imgproc,
    prelude::*,
    videoio,
};
use tracing::{info, warn};

use crate::config::Config;
use crate::detector::DetectionsFile;
use crate::error::Error;
use crate::flow::FarnebackFlow;
use crate::lane::LaneGeometry;
use crate::pipeline::{self, DistanceFrame, FrameSink, FrameSource, SpeedFrame};
use crate::speed::DetectionLine;

const GREEN: (f64, f64, f64) = (0.0, 255.0, 0.0);
const RED: (f64, f64, f64) = (0.0, 0.0, 255.0);
const BLUE: (f64, f64, f64) = (255.0, 0.0, 0.0);
const MAGENTA: (f64, f64, f64) = (255.0, 0.0, 255.0);

const PALETTE: [(f64, f64, f64); 8] = [
    (56.0, 56.0, 255.0),
    (151.0, 157.0, 255.0),
    (31.0, 112.0, 255.0),
    (29.0, 178.0, 255.0),
    (49.0, 210.0, 207.0),
    (10.0, 249.0, 72.0),
    (23.0, 204.0, 146.0),
    (134.0, 219.0, 61.0),
];

#[inline]
fn scalar((b, g, r): (f64, f64, f64)) -> core::Scalar {
    core::Scalar::new(b, g, r, 255.0)
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub struct VideoSource {
    cap: videoio::VideoCapture,
    dims: (u32, u32),
    fps: f32,
}

impl VideoSource {
    pub fn open(path: &Path) -> Result<Self, Error> {
        let name = path_str(path);
        let open_failed = || Error::InputOpen { path: name.clone() };

        let cap = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)
            .map_err(|_| open_failed())?;
        if !cap.is_opened().unwrap_or(false) {
            return Err(open_failed());
        }

        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        let fps = cap.get(videoio::CAP_PROP_FPS)? as f32;

        info!("video {} opened: {}x{} @ {:.1} fps", name, width, height, fps);

        Ok(Self {
            cap,
            dims: (width, height),
            fps,
        })
    }
}

impl FrameSource for VideoSource {
    type Image = Mat;

    #[inline]
    fn dims(&self) -> (u32, u32) {
        self.dims
    }

    #[inline]
    fn fps(&self) -> f32 {
        self.fps
    }

    fn read(&mut self) -> Result<Option<Mat>, Error> {
        let mut frame = Mat::default();

        if !self.cap.read(&mut frame)? || frame.cols() == 0 || frame.rows() == 0 {
            return Ok(None);
        }

        Ok(Some(frame))
    }
}

/// Output video, released exactly once either explicitly or on drop
pub struct VideoSink {
    writer: Option<videoio::VideoWriter>,
    out_file: String,
}

impl VideoSink {
    pub fn create(path: &Path, dims: (u32, u32), fps: f32) -> Result<Self, Error> {
        let out_file = path_str(path);
        let create_failed = || Error::OutputCreate {
            path: out_file.clone(),
        };

        let fourcc = videoio::VideoWriter::fourcc(b'm' as _, b'p' as _, b'4' as _, b'v' as _)?;
        let writer = videoio::VideoWriter::new(
            &out_file,
            fourcc,
            fps as f64,
            core::Size::new(dims.0 as i32, dims.1 as i32),
            true,
        )
        .map_err(|_| create_failed())?;

        if !writer.is_opened().unwrap_or(false) {
            return Err(create_failed());
        }

        Ok(Self {
            writer: Some(writer),
            out_file,
        })
    }
}

impl FrameSink<Mat> for VideoSink {
    fn write(&mut self, image: &Mat) -> Result<(), Error> {
        if let Some(w) = self.writer.as_mut() {
            w.write(image)?;
        }

        Ok(())
    }

    fn release(&mut self) -> Result<(), Error> {
        if let Some(mut w) = self.writer.take() {
            w.release()?;
            info!("output video saved to {}", self.out_file);
        }

        Ok(())
    }
}

impl Drop for VideoSink {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("releasing {} failed: {}", self.out_file, err);
        }
    }
}

pub fn to_gray(image: &Mat) -> Result<Mat, Error> {
    let mut gray = Mat::default();
    imgproc::cvt_color(image, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;

    Ok(gray)
}

fn label(frame: &mut Mat, text: &str, at: core::Point, color: core::Scalar) -> opencv::Result<()> {
    imgproc::put_text(
        frame,
        text,
        at,
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.5,
        color,
        2,
        imgproc::LINE_AA,
        false,
    )
}

fn bbox_rect(track: &crate::Track) -> core::Rect {
    let b = track.detection.bbox.as_ltwh();

    core::Rect::new(
        b.left() as i32,
        b.top() as i32,
        b.width() as i32,
        b.height() as i32,
    )
}

pub fn annotate_distance(
    frame: &mut Mat,
    out: &DistanceFrame<'_>,
    lane: &LaneGeometry,
) -> Result<(), Error> {
    for track in out.tracks {
        let rect = bbox_rect(track);

        imgproc::rectangle(frame, rect, scalar(GREEN), 2, imgproc::LINE_8, 0)?;
        label(
            frame,
            &format!("Car {}", track.id),
            core::Point::new(rect.x, rect.y - 10),
            scalar(GREEN),
        )?;
    }

    if let Some(closest) = &out.closest {
        let src = core::Point::new(lane.source.x as i32, lane.source.y as i32);
        let dst = core::Point::new(closest.centroid.x as i32, closest.centroid.y as i32);

        imgproc::line(frame, src, dst, scalar(RED), 2, imgproc::LINE_8, 0)?;
        label(
            frame,
            &format!("Distance: {:.2} m", closest.meters),
            core::Point::new((src.x + dst.x) / 2, (src.y + dst.y) / 2),
            scalar(RED),
        )?;
    }

    Ok(())
}

pub fn annotate_speed(
    frame: &mut Mat,
    out: &SpeedFrame<'_>,
    line: &DetectionLine,
) -> Result<(), Error> {
    imgproc::line(
        frame,
        core::Point::new(line.start.x as i32, line.start.y as i32),
        core::Point::new(line.end.x as i32, line.end.y as i32),
        scalar(BLUE),
        5,
        imgproc::LINE_8,
        0,
    )?;

    for track in out.tracks {
        let (text, color) = match out.speeds.get(&track.id) {
            Some(speed) => (
                format!("{:.2} km/h", speed),
                PALETTE[track.id as usize % PALETTE.len()],
            ),
            None => (track.detection.class.name().to_string(), MAGENTA),
        };

        let rect = bbox_rect(track);
        let center = track.centroid();

        imgproc::rectangle(frame, rect, scalar(color), 2, imgproc::LINE_8, 0)?;
        label(frame, &text, core::Point::new(rect.x, rect.y - 10), scalar(color))?;
        imgproc::circle(
            frame,
            core::Point::new(center.x as i32, center.y as i32),
            5,
            scalar(color),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
    }

    Ok(())
}

/// Distance session: video in, annotated video plus JSON out
pub fn distance_session(
    input: &Path,
    detections: &Path,
    json: &Path,
    output: &Path,
    config: &Config,
) -> Result<(), Error> {
    let mut source = VideoSource::open(input)?;
    let mut detector = DetectionsFile::open(detections, config.detector.clone())?;
    let mut sink = VideoSink::create(output, source.dims(), source.fps())?;

    let log = pipeline::run_distance(
        &mut source,
        &mut detector,
        &mut sink,
        config,
        annotate_distance,
    )?;

    log.save(json)
}

/// Speed session: video in, annotated video plus JSON out
pub fn speed_session(
    input: &Path,
    detections: &Path,
    json: &Path,
    output: &Path,
    config: &Config,
) -> Result<(), Error> {
    let mut source = VideoSource::open(input)?;
    let mut detector = DetectionsFile::open(detections, config.detector.clone())?;
    let mut sink = VideoSink::create(output, source.dims(), source.fps())?;

    let log = pipeline::run_speed(
        &mut source,
        &mut detector,
        &mut sink,
        FarnebackFlow::new(config.speed.flow.clone()),
        config,
        to_gray,
        annotate_speed,
    )?;

    log.save(json)
}
