//! # DICOM RT-Struct to SEG library
//!
//! This crate converts the contours of a DICOM RT Structure Set into a DICOM
//! Segmentation object for the series they were drawn on.
//!
//! It is built on the dicom-rs ecosystem. An RT Structure Set is decoded
//! into polygons that are kept in a [`VolumeRegistry`], grouped by series and
//! structure set label. On export the polygons of the selected ROIs are
//! rasterized onto the pixel grid of the series and written as one
//! multi-frame Segmentation with a segment per ROI.
//! Contour extraction and rasterization run in parallel using rayon.
//! Only what the conversion needs is supported:
//!  - CLOSED_PLANAR contours; other geometric types are skipped
//!  - Explicit VR Little Endian output, uncompressed
//!  - BINARY (1 bit) or FRACTIONAL (8 bit) segmentations
//!
//! Problems that only affect a single contour or polygon do not abort the
//! operation. They are returned as [`Diagnostic`]s next to the result and
//! logged with `tracing`.
//!
//! # Examples
//!
//! ## Converting a structure set
//!
//! Load the geometry of the series from the dicom/ directory, import the
//! structure set and export all of its ROIs with default Tissue codes.
//!
//! ```no_run
//! # use dicom_rtstruct_seg::{DefaultSegmentMetadata, ExportOptions, RoiSession, SeriesLoader, SortBy};
//! # use std::collections::HashMap;
//! let series = SeriesLoader::load_from_directory("dicom", SortBy::ImagePositionPatient)
//!     .expect("should have loaded the series");
//! let series_uid = series.series_instance_uid.clone();
//! let session = RoiSession::new(HashMap::from([(series_uid.clone(), series)]), ExportOptions::default());
//!
//! let buffer = std::fs::read("rtstruct.dcm").expect("should have read the structure set");
//! let report = session
//!     .decode(&buffer, &series_uid, "Contours", "RTSTRUCT")
//!     .expect("should have decoded the structure set");
//! println!("{} polygons, {} skipped", report.polygons.len(), report.diagnostics.len());
//!
//! let rois = session.list_exportable_rois(&series_uid);
//! let ids: Vec<_> = rois.iter().map(|roi| roi.id.clone()).collect();
//! let names = rois.into_iter().map(|roi| (roi.id, roi.name)).collect();
//! let seg = session
//!     .export(&series_uid, &ids, &DefaultSegmentMetadata::new(&names))
//!     .expect("should have encoded the segmentation");
//! std::fs::write("seg.dcm", seg).expect("should have written the segmentation");
//! ```

pub mod anatomy;
mod attributes;
pub mod config;
pub mod enums;
pub mod error;
pub mod geometry;
pub mod mask;
pub mod model;
pub mod registry;
pub mod rtstruct;
pub mod seg_reader;
pub mod seg_writer;
pub mod series_loader;
pub mod session;
pub mod tags;

pub use config::ExportOptions;
pub use enums::{PixelPacking, SortBy};
pub use error::{DecodeError, Diagnostic, EncodeError, ValidationError};
pub use geometry::{SeriesGeometry, SeriesMetadata, SeriesMetadataProvider, SliceGeometry};
pub use mask::{Mask, MaskExtractor};
pub use model::{Point3, Polygon, PolygonSummary, RoiContour, SegmentDescriptor, StructureSet};
pub use registry::VolumeRegistry;
pub use rtstruct::RtStructDecoder;
pub use seg_reader::{Segmentation, read_segmentation};
pub use seg_writer::{DicomSegWriter, Segment};
pub use series_loader::{SeriesLoader, SeriesLoaderError};
pub use session::{
    DefaultSegmentMetadata, ExportReport, ExportableRoi, RoiSession, SegmentMetadataProvider,
};
