//! Per-track time series collected over a session and written as JSON once
//! the video is done.

use std::fmt;
use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::info;

use crate::error::Error;

pub trait Unit: fmt::Debug + Copy + PartialEq {
    const FIELD: &'static str;
    const TIMESTAMP_SUFFIX: &'static str;
    const VALUE_SUFFIX: &'static str;
}

/// Distance to the closest in-lane vehicle, in meters
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Distance;
impl Unit for Distance {
    const FIELD: &'static str = "distance";
    const TIMESTAMP_SUFFIX: &'static str = "seconds";
    const VALUE_SUFFIX: &'static str = "meters";
}

/// Vehicle speed, in km/h
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Speed;
impl Unit for Speed {
    const FIELD: &'static str = "speed";
    const TIMESTAMP_SUFFIX: &'static str = "s";
    const VALUE_SUFFIX: &'static str = "km/h";
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Record<U: Unit> {
    pub timestamp: f32,
    pub value: f32,
    unit: PhantomData<U>,
}

impl<U: Unit> Record<U> {
    #[inline]
    pub fn new(timestamp: f32, value: f32) -> Self {
        Self {
            timestamp,
            value,
            unit: PhantomData,
        }
    }
}

impl<U: Unit> Serialize for Record<U> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry(
            "timestamp",
            &format!("{:.2} {}", self.timestamp, U::TIMESTAMP_SUFFIX),
        )?;
        map.serialize_entry(U::FIELD, &format!("{:.2} {}", self.value, U::VALUE_SUFFIX))?;
        map.end()
    }
}

/// Records grouped by track id. Ids keep the order they were first seen in;
/// with a cap, records past it are dropped (the first ones win).
#[derive(Debug, Clone)]
pub struct TrackLog<U: Unit> {
    cap: Option<usize>,
    entries: Vec<(u32, Vec<Record<U>>)>,
}

pub type DistanceLog = TrackLog<Distance>;
pub type SpeedLog = TrackLog<Speed>;

impl<U: Unit> Default for TrackLog<U> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<U: Unit> TrackLog<U> {
    pub fn new(cap: Option<usize>) -> Self {
        Self {
            cap,
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn capped(cap: usize) -> Self {
        Self::new(Some(cap))
    }

    /// Appends a record, `false` when the track is already full
    pub fn push(&mut self, id: u32, timestamp: f32, value: f32) -> bool {
        let idx = match self.entries.iter().position(|(i, _)| *i == id) {
            Some(idx) => idx,
            None => {
                self.entries.push((id, Vec::new()));
                self.entries.len() - 1
            }
        };

        let records = &mut self.entries[idx].1;
        if self.cap.map_or(false, |cap| records.len() >= cap) {
            return false;
        }

        records.push(Record::new(timestamp, value));
        true
    }

    pub fn get(&self, id: u32) -> Option<&[Record<U>]> {
        self.entries
            .iter()
            .find(|(i, _)| *i == id)
            .map(|(_, r)| r.as_slice())
    }

    #[inline]
    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON with four space indentation
    pub fn write_json<W: Write>(&self, writer: W) -> Result<(), Error> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut ser)?;

        Ok(())
    }

    pub fn to_json(&self) -> Result<String, Error> {
        let mut buf = Vec::new();
        self.write_json(&mut buf)?;

        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let path = path.as_ref();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }

        let file = std::fs::File::create(path)?;
        let mut writer = std::io::BufWriter::new(file);
        self.write_json(&mut writer)?;
        writer.flush()?;

        info!("{} records of {} tracks saved to {}", U::FIELD, self.len(), path.display());

        Ok(())
    }
}

impl<U: Unit> Serialize for TrackLog<U> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (id, records) in &self.entries {
            map.serialize_entry(&id.to_string(), records)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_keeps_first_records_in_arrival_order() {
        let mut log = SpeedLog::capped(8);

        for i in 0..12 {
            log.push(3, i as f32 * 0.1, i as f32);
        }

        let records = log.get(3).unwrap();
        assert_eq!(records.len(), 8);

        let values: Vec<f32> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        assert!(!log.push(3, 5.0, 99.0));
    }

    #[test]
    fn uncapped_log_keeps_everything() {
        let mut log = DistanceLog::default();

        for i in 0..100 {
            assert!(log.push(0, i as f32, 1.0));
        }

        assert_eq!(log.get(0).map(|r| r.len()), Some(100));
    }

    #[test]
    fn ids_keep_first_seen_order() {
        let mut log = DistanceLog::default();
        log.push(5, 0.0, 1.0);
        log.push(2, 0.1, 1.0);
        log.push(5, 0.2, 1.0);

        assert_eq!(log.ids().collect::<Vec<_>>(), vec![5, 2]);

        let json = log.to_json().unwrap();
        assert!(json.find("\"5\"").unwrap() < json.find("\"2\"").unwrap());
    }

    #[test]
    fn distance_json_schema() {
        let mut log = DistanceLog::default();
        log.push(0, 0.05, 3.14159);

        let value: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "0": [{ "timestamp": "0.05 seconds", "distance": "3.14 meters" }]
            })
        );
    }

    #[test]
    fn speed_json_schema() {
        let mut log = SpeedLog::capped(8);
        log.push(12, 1.5, 54.0);

        let value: serde_json::Value = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "12": [{ "timestamp": "1.50 s", "speed": "54.00 km/h" }]
            })
        );
    }

    #[test]
    fn infinite_distance_is_written_as_inf() {
        let mut log = DistanceLog::default();
        log.push(1, 0.0, f32::INFINITY);

        assert!(log.to_json().unwrap().contains("\"inf meters\""));
    }
}
