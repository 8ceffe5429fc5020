use thiserror::Error;

/// Fatal failure while reading an RT Structure Set or Segmentation buffer.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("buffer is not a valid DICOM file: {0}")]
    Parse(#[from] dicom::object::ReadError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("DICOM file is not an RT-Struct. It has SOPClassUID: {found}")]
    NotRtStruct { found: String },

    #[error("DICOM file is not a Segmentation. It has SOPClassUID: {found}")]
    NotSegmentation { found: String },

    #[error("missing mandatory attribute {name}")]
    MissingAttribute { name: &'static str },

    #[error("invalid value for attribute {name}: {reason}")]
    InvalidAttribute { name: &'static str, reason: String },
}

/// Non-fatal problem met while decoding or rasterizing.
///
/// The offending contour or polygon is skipped and processing continues.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Diagnostic {
    #[error("contour {contour} references instance {sop_instance_uid} outside of the target series")]
    ReferenceMismatch {
        contour: String,
        sop_instance_uid: String,
    },

    #[error("contour {contour} has unsupported geometric type {geometric_type}")]
    UnsupportedGeometry {
        contour: String,
        geometric_type: String,
    },

    #[error("polygon {polygon} has fewer than 3 distinct points")]
    DegeneratePolygon { polygon: String },

    #[error("polygon {polygon} lies on instance {sop_instance_uid} which has no geometry")]
    UnmappedSlice {
        polygon: String,
        sop_instance_uid: String,
    },

    #[error("ROI {roi_contour} has no mask on the series grid")]
    EmptySegment { roi_contour: String },
}

/// Fatal failure while building a Segmentation object.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("no metadata available for series {0}")]
    UnknownSeries(String),

    #[error("ROI {0} does not exist in the series")]
    UnknownRoi(String),

    #[error("no segment metadata supplied for ROI {0}")]
    MissingSegmentMetadata(String),

    #[error("segment \"{segment}\" is missing its {code} code")]
    MissingCode {
        segment: String,
        code: &'static str,
    },

    #[error("mask is {actual:?} (rows, columns) but the series grid is {expected:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("grid of {0} x {1} pixels cannot be encoded")]
    GridTooLarge(usize, usize),

    #[error("{0} segments exceed the 65535 a Segmentation can number")]
    TooManySegments(usize),

    #[error("mask references instance {0} which is not part of the series")]
    UnknownSlice(String),

    #[error("nothing to export: no segment has any frame")]
    NoFrames,

    #[error("could not build file meta group: {0}")]
    FileMeta(String),

    #[error("could not write DICOM-SEG: {0}")]
    Write(#[from] dicom::object::WriteError),
}
