use crate::model::Point3;

/// Position of one image of the series.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceGeometry {
    pub sop_instance_uid: String,
    /// Image Position (Patient): centre of the first transmitted pixel.
    pub image_position: [f64; 3],
}

/// Pixel grid shared by every slice of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesGeometry {
    pub rows: usize,
    pub columns: usize,
    /// Pixel Spacing as (row spacing, column spacing) in millimetres.
    pub pixel_spacing: [f64; 2],
    /// Image Orientation (Patient): row cosine followed by column cosine.
    pub image_orientation: [f64; 6],
    pub slice_thickness: Option<f64>,
    /// Slices in series order.
    pub slices: Vec<SliceGeometry>,
}

impl SeriesGeometry {
    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    pub fn slice_index(&self, sop_instance_uid: &str) -> Option<usize> {
        self.slices
            .iter()
            .position(|slice| slice.sop_instance_uid == sop_instance_uid)
    }

    pub fn slice(&self, sop_instance_uid: &str) -> Option<&SliceGeometry> {
        self.slices
            .iter()
            .find(|slice| slice.sop_instance_uid == sop_instance_uid)
    }

    pub fn patient_to_pixel(&self, sop_instance_uid: &str) -> Option<PatientToPixel> {
        let slice = self.slice(sop_instance_uid)?;
        let [row_spacing, column_spacing] = self.pixel_spacing;
        if ![row_spacing, column_spacing].iter().all(|s| s.is_finite() && *s > 0.0) {
            return None;
        }
        let [rx, ry, rz, cx, cy, cz] = self.image_orientation;
        Some(PatientToPixel {
            origin: slice.image_position,
            row_cosine: [rx, ry, rz],
            column_cosine: [cx, cy, cz],
            row_spacing,
            column_spacing,
        })
    }

    /// Unit normal of the image plane.
    pub fn normal(&self) -> [f64; 3] {
        let [rx, ry, rz, cx, cy, cz] = self.image_orientation;
        [ry * cz - rz * cy, rz * cx - rx * cz, rx * cy - ry * cx]
    }
}

/// Affine map from patient coordinates onto the pixel grid of one slice.
///
/// Pixel coordinates are `(column, row)` with pixel centres on integers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatientToPixel {
    pub origin: [f64; 3],
    pub row_cosine: [f64; 3],
    pub column_cosine: [f64; 3],
    pub row_spacing: f64,
    pub column_spacing: f64,
}

impl PatientToPixel {
    pub fn apply(&self, point: &Point3) -> (f64, f64) {
        let d = [
            point.x - self.origin[0],
            point.y - self.origin[1],
            point.z - self.origin[2],
        ];
        let column = dot(&d, &self.row_cosine) / self.column_spacing;
        let row = dot(&d, &self.column_cosine) / self.row_spacing;
        (column, row)
    }
}

pub(crate) fn dot(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// Everything the exporter needs to know about the source series.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMetadata {
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub frame_of_reference_uid: Option<String>,
    /// SOP Class UID of the source images.
    pub sop_class_uid: String,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub study_date: Option<String>,
    pub geometry: SeriesGeometry,
}

/// Collaborator providing metadata of the series currently being viewed.
pub trait SeriesMetadataProvider {
    fn series_metadata(&self, series_instance_uid: &str) -> Option<SeriesMetadata>;
}

impl SeriesMetadataProvider for std::collections::HashMap<String, SeriesMetadata> {
    fn series_metadata(&self, series_instance_uid: &str) -> Option<SeriesMetadata> {
        self.get(series_instance_uid).cloned()
    }
}
