use nalgebra as na;

use crate::bbox::{BBox, Ltrb};

/// Vehicle categories kept by the detection adapter (COCO ids 2, 5, 7)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VehicleClass {
    Car,
    Bus,
    Truck,
}

impl VehicleClass {
    pub fn from_coco(class: i32) -> Option<Self> {
        match class {
            2 => Some(VehicleClass::Car),
            5 => Some(VehicleClass::Bus),
            7 => Some(VehicleClass::Truck),
            _ => None,
        }
    }

    pub fn coco_id(&self) -> i32 {
        match self {
            VehicleClass::Car => 2,
            VehicleClass::Bus => 5,
            VehicleClass::Truck => 7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VehicleClass::Car => "car",
            VehicleClass::Bus => "bus",
            VehicleClass::Truck => "truck",
        }
    }
}

/// Single vehicle found on a frame, in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub bbox: BBox<Ltrb>,
    pub class: VehicleClass,

    // persistent id assigned by the detector itself, if it tracks
    pub native_id: Option<u32>,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class: VehicleClass) -> Self {
        Self {
            bbox: BBox::ltrb(x1, y1, x2, y2),
            class,
            native_id: None,
        }
    }

    #[inline]
    pub fn with_native_id(mut self, id: u32) -> Self {
        self.native_id = Some(id);
        self
    }

    #[inline(always)]
    pub fn centroid(&self) -> na::Point2<f32> {
        self.bbox.centroid()
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    #[inline]
    pub fn centroid_distance(&self, other: &Detection) -> f32 {
        na::distance(&self.centroid(), &other.centroid())
    }
}
