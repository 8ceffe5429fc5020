use serde::Deserialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A point in patient coordinates (millimetres).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// One planar contour lying on a single image slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    /// Contour path in patient space; order matters.
    pub points: Vec<Point3>,
    pub referenced_sop_instance_uid: String,
    pub series_instance_uid: String,
    pub structure_set_label: String,
    pub roi_contour_uid: String,
    pub uid: String,
    pub referenced_frame_number: Option<u32>,
}

impl Polygon {
    pub fn summary(&self) -> PolygonSummary {
        PolygonSummary {
            uid: self.uid.clone(),
            roi_contour_uid: self.roi_contour_uid.clone(),
            referenced_sop_instance_uid: self.referenced_sop_instance_uid.clone(),
            point_count: self.points.len(),
        }
    }
}

/// Lightweight view of an imported polygon handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonSummary {
    pub uid: String,
    pub roi_contour_uid: String,
    pub referenced_sop_instance_uid: String,
    pub point_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoiContour {
    pub uid: String,
    pub name: String,
    pub polygons: Vec<Polygon>,
    /// ROI Display Color as RGB, if the source carried one.
    pub color: Option<[u8; 3]>,
}

impl RoiContour {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
            polygons: Vec::new(),
            color: None,
        }
    }

    /// Number of polygons holding at least one point.
    pub fn polygon_count(&self) -> usize {
        self.polygons.iter().filter(|p| !p.points.is_empty()).count()
    }
}

pub type SharedRoiContour = Arc<RwLock<RoiContour>>;
pub type SharedStructureSet = Arc<RwLock<StructureSet>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructureSetKey {
    pub series_instance_uid: String,
    pub label: String,
}

impl StructureSetKey {
    pub fn new(series_instance_uid: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            series_instance_uid: series_instance_uid.into(),
            label: label.into(),
        }
    }
}

/// Attributes given to a structure set when it is first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureSetDefaults {
    pub name: String,
    pub is_locked: bool,
    pub visible: bool,
}

impl Default for StructureSetDefaults {
    fn default() -> Self {
        Self {
            name: String::new(),
            is_locked: false,
            visible: true,
        }
    }
}

#[derive(Debug)]
pub struct StructureSet {
    pub key: StructureSetKey,
    pub name: String,
    pub is_locked: bool,
    pub visible: bool,
    pub(crate) roi_contours: Vec<SharedRoiContour>,
}

impl StructureSet {
    pub fn new(key: StructureSetKey, defaults: StructureSetDefaults) -> Self {
        Self {
            key,
            name: defaults.name,
            is_locked: defaults.is_locked,
            visible: defaults.visible,
            roi_contours: Vec::new(),
        }
    }

    pub fn roi_contours(&self) -> &[SharedRoiContour] {
        &self.roi_contours
    }

    pub fn find_roi_contour(&self, uid: &str) -> Option<SharedRoiContour> {
        self.roi_contours
            .iter()
            .find(|roi| read_lock(roi).uid == uid)
            .cloned()
    }

    /// ROI contours that hold at least one non-empty polygon.
    pub fn non_empty_roi_contours(&self) -> Vec<SharedRoiContour> {
        self.roi_contours
            .iter()
            .filter(|roi| read_lock(roi).polygon_count() > 0)
            .cloned()
            .collect()
    }
}

/// Descriptive metadata attached to a ROI when it is exported as a segment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SegmentDescriptor {
    pub label: String,
    #[serde(default)]
    pub category_code: Option<String>,
    #[serde(default)]
    pub type_code: Option<String>,
    #[serde(default)]
    pub modifier_code: Option<String>,
}

impl SegmentDescriptor {
    pub fn new(
        label: impl Into<String>,
        category_code: impl Into<String>,
        type_code: impl Into<String>,
    ) -> Self {
        Self {
            label: label.into(),
            category_code: Some(category_code.into()),
            type_code: Some(type_code.into()),
            modifier_code: None,
        }
    }

    pub fn with_modifier(mut self, modifier_code: impl Into<String>) -> Self {
        self.modifier_code = Some(modifier_code.into());
        self
    }
}

pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
