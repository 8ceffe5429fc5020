//! Entry points used by a viewer: import structure sets, list what can be
//! exported, and export selected ROIs as a Segmentation.

use crate::anatomy;
use crate::config::ExportOptions;
use crate::error::{DecodeError, Diagnostic, EncodeError};
use crate::geometry::SeriesMetadataProvider;
use crate::mask::MaskExtractor;
use crate::model::{PolygonSummary, SegmentDescriptor, read_lock};
use crate::registry::VolumeRegistry;
use crate::rtstruct::RtStructDecoder;
use crate::seg_writer::{DicomSegWriter, Segment};
use std::collections::HashMap;
use tracing::{debug, info};

/// Collaborator supplying the segment metadata of each ROI selected for
/// export, keyed by ROI contour UID.
pub trait SegmentMetadataProvider {
    fn segment_descriptor(&self, roi_contour_uid: &str) -> Option<SegmentDescriptor>;
}

impl SegmentMetadataProvider for HashMap<String, SegmentDescriptor> {
    fn segment_descriptor(&self, roi_contour_uid: &str) -> Option<SegmentDescriptor> {
        self.get(roi_contour_uid).cloned()
    }
}

/// Labels every ROI with its own name under the default Tissue codes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSegmentMetadata<'a> {
    names: Option<&'a HashMap<String, String>>,
}

impl<'a> DefaultSegmentMetadata<'a> {
    pub fn new(names: &'a HashMap<String, String>) -> Self {
        Self { names: Some(names) }
    }
}

impl SegmentMetadataProvider for DefaultSegmentMetadata<'_> {
    fn segment_descriptor(&self, roi_contour_uid: &str) -> Option<SegmentDescriptor> {
        let label = self
            .names
            .and_then(|names| names.get(roi_contour_uid))
            .map_or(roi_contour_uid, String::as_str);
        Some(SegmentDescriptor::new(label, anatomy::DEFAULT_CODE, anatomy::DEFAULT_CODE))
    }
}

#[derive(Debug, Default)]
pub struct DecodeReport {
    pub polygons: Vec<PolygonSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Encoded Segmentation together with what was skipped while rasterizing.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub buffer: Vec<u8>,
    pub diagnostics: Vec<Diagnostic>,
}

/// ROI offered for export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportableRoi {
    pub id: String,
    pub name: String,
    pub polygon_count: usize,
}

pub struct RoiSession<M> {
    registry: VolumeRegistry,
    metadata: M,
    options: ExportOptions,
}

impl<M: SeriesMetadataProvider> RoiSession<M> {
    pub fn new(metadata: M, options: ExportOptions) -> Self {
        Self {
            registry: VolumeRegistry::new(),
            metadata,
            options,
        }
    }

    pub fn registry(&self) -> &VolumeRegistry {
        &self.registry
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Import an RT Structure Set for `series_instance_uid`.
    ///
    /// # Errors
    ///
    /// See [`RtStructDecoder::decode`]; on error nothing is registered.
    pub fn decode(
        &self,
        buffer: &[u8],
        series_instance_uid: &str,
        collection_name: &str,
        collection_label: &str,
    ) -> Result<DecodeReport, DecodeError> {
        let outcome = RtStructDecoder::new(&self.registry).decode(
            buffer,
            series_instance_uid,
            collection_name,
            collection_label,
        )?;
        Ok(DecodeReport {
            polygons: outcome.polygons.iter().map(|polygon| polygon.summary()).collect(),
            diagnostics: outcome.diagnostics,
        })
    }

    /// Non-empty ROIs of every structure set imported for the series.
    pub fn list_exportable_rois(&self, series_instance_uid: &str) -> Vec<ExportableRoi> {
        self.registry
            .structure_sets_for_series(series_instance_uid)
            .iter()
            .flat_map(|structure_set| VolumeRegistry::list_non_empty_roi_contours(&read_lock(structure_set)))
            .map(|roi| {
                let roi = read_lock(&roi);
                ExportableRoi {
                    id: roi.uid.clone(),
                    name: roi.name.clone(),
                    polygon_count: roi.polygon_count(),
                }
            })
            .collect()
    }

    /// Rasterize the selected ROIs and encode them as one Segmentation,
    /// one segment per ROI in selection order.
    ///
    /// # Errors
    ///
    /// Fails on an unknown series or ROI, on missing segment metadata, and
    /// on anything [`DicomSegWriter::write`] rejects. No buffer is produced
    /// in that case.
    pub fn export(
        &self,
        series_instance_uid: &str,
        roi_contour_uids: &[impl AsRef<str>],
        segment_metadata: &impl SegmentMetadataProvider,
    ) -> Result<Vec<u8>, EncodeError> {
        self.export_with_diagnostics(series_instance_uid, roi_contour_uids, segment_metadata)
            .map(|report| report.buffer)
    }

    /// Same as [`RoiSession::export`], also returning the polygons skipped
    /// during rasterization and the selected ROIs that produced no mask.
    pub fn export_with_diagnostics(
        &self,
        series_instance_uid: &str,
        roi_contour_uids: &[impl AsRef<str>],
        segment_metadata: &impl SegmentMetadataProvider,
    ) -> Result<ExportReport, EncodeError> {
        let series = self
            .metadata
            .series_metadata(series_instance_uid)
            .ok_or_else(|| EncodeError::UnknownSeries(series_instance_uid.to_string()))?;
        let extractor = MaskExtractor::new(&series.geometry);

        let mut segments = Vec::with_capacity(roi_contour_uids.len());
        let mut diagnostics = Vec::new();
        for uid in roi_contour_uids.iter().map(AsRef::as_ref) {
            let roi = self
                .registry
                .find_roi_contour(series_instance_uid, uid)
                .ok_or_else(|| EncodeError::UnknownRoi(uid.to_string()))?;
            let descriptor = segment_metadata
                .segment_descriptor(uid)
                .ok_or_else(|| EncodeError::MissingSegmentMetadata(uid.to_string()))?;

            let color = read_lock(&roi).color;
            let extraction = extractor.extract_roi_masks(std::slice::from_ref(&roi));
            debug!(
                roi = uid,
                masks = extraction.masks.len(),
                skipped = extraction.diagnostics.len(),
                "rasterized ROI"
            );
            diagnostics.extend(extraction.diagnostics);
            if extraction.masks.is_empty() {
                diagnostics.push(Diagnostic::EmptySegment {
                    roi_contour: uid.to_string(),
                });
            }
            segments.push(Segment {
                descriptor,
                color,
                masks: extraction.masks,
            });
        }

        let buffer = DicomSegWriter::new(&series, &self.options).write(&segments)?;
        info!(
            series = series_instance_uid,
            segments = segments.len(),
            skipped = diagnostics.len(),
            "exported segmentation"
        );
        Ok(ExportReport { buffer, diagnostics })
    }
}
