//! Reading of RT Structure Set files into polygons.

use crate::attributes::{
    first_item, floats, items, read_buffer, required_floats, required_items, required_string,
    required_uint, string, uint,
};
use crate::enums::ContourGeometricType;
use crate::error::{DecodeError, Diagnostic, ValidationError};
use crate::model::{Point3, Polygon, StructureSetDefaults, write_lock};
use crate::registry::VolumeRegistry;
use crate::tags;
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::uids;
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Result of a successful decode: the imported polygons plus any contours
/// that were skipped along the way.
#[derive(Debug, Default)]
pub struct DecodeOutcome {
    pub polygons: Vec<Polygon>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Identity of the structure set file being decoded.
struct StructFile<'a> {
    sop_instance_uid: String,
    label: String,
    name: Option<String>,
    series_instance_uid: &'a str,
    collection_label: &'a str,
    members: &'a HashSet<String>,
}

impl StructFile<'_> {
    fn roi_uid(&self, roi_number: &str) -> String {
        format!("{}.{}.{}", self.sop_instance_uid, self.label, roi_number)
    }

    fn roi_name(&self, roi_number: &str) -> String {
        match &self.name {
            Some(name) => format!("{name} Lesion {roi_number}"),
            None => format!("{} Lesion {roi_number}", self.label),
        }
    }
}

/// Contours of one ROI Contour Sequence item.
struct RoiExtraction {
    uid: String,
    name: String,
    color: Option<[u8; 3]>,
    polygons: Vec<Polygon>,
    diagnostics: Vec<Diagnostic>,
}

pub struct RtStructDecoder<'a> {
    registry: &'a VolumeRegistry,
}

impl<'a> RtStructDecoder<'a> {
    pub fn new(registry: &'a VolumeRegistry) -> Self {
        Self { registry }
    }

    /// Decode an RT Structure Set and register its closed planar contours
    /// that lie on `series_instance_uid`.
    ///
    /// Nothing is registered unless the whole file decodes: ROI contours are
    /// built in a staging registry and committed at the end.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Parse`] for malformed DICOM and
    /// [`DecodeError::Validation`] for a wrong SOP class or a missing
    /// mandatory attribute.
    pub fn decode(
        &self,
        buffer: &[u8],
        series_instance_uid: &str,
        collection_name: &str,
        collection_label: &str,
    ) -> Result<DecodeOutcome, DecodeError> {
        let object = read_buffer(buffer)?;

        let sop_class_uid = string(&object, tags::SOP_CLASS_UID).unwrap_or_default();
        if sop_class_uid != uids::RT_STRUCTURE_SET_STORAGE {
            return Err(ValidationError::NotRtStruct {
                found: sop_class_uid,
            }
            .into());
        }

        let members = Self::referenced_instances(&object, series_instance_uid)?;
        if members.is_empty() {
            info!(
                series = series_instance_uid,
                "structure set does not reference the target series"
            );
            return Ok(DecodeOutcome::default());
        }

        let file = StructFile {
            sop_instance_uid: required_string(&object, tags::SOP_INSTANCE_UID)?,
            label: required_string(&object, tags::STRUCTURE_SET_LABEL)?,
            name: string(&object, tags::STRUCTURE_SET_NAME),
            series_instance_uid,
            collection_label,
            members: &members,
        };

        let extractions = required_items(&object, tags::ROI_CONTOUR_SEQUENCE)?
            .par_iter()
            .map(|item| Self::extract_roi(item, &file))
            .collect::<Result<Vec<_>, _>>()?;

        let staged = VolumeRegistry::new();
        staged.get_or_create_structure_set(
            series_instance_uid,
            collection_label,
            StructureSetDefaults {
                name: collection_name.to_string(),
                is_locked: true,
                visible: true,
            },
        );

        let mut outcome = DecodeOutcome::default();
        for extraction in extractions {
            let roi = staged.get_or_create_roi_contour(
                series_instance_uid,
                collection_label,
                &extraction.name,
                &extraction.uid,
            );
            let mut roi = write_lock(&roi);
            if extraction.color.is_some() {
                roi.color = extraction.color;
            }
            roi.polygons.extend(extraction.polygons.iter().cloned());
            outcome.polygons.extend(extraction.polygons);
            outcome.diagnostics.extend(extraction.diagnostics);
        }
        self.registry.commit(staged);

        info!(
            series = series_instance_uid,
            label = collection_label,
            polygons = outcome.polygons.len(),
            skipped = outcome.diagnostics.len(),
            "imported RT structure set"
        );
        Ok(outcome)
    }

    /// SOP Instance UIDs listed for the target series under
    /// Referenced Frame of Reference → RT Referenced Study → RT Referenced Series.
    fn referenced_instances(
        object: &InMemDicomObject,
        series_instance_uid: &str,
    ) -> Result<HashSet<String>, ValidationError> {
        for frame_of_reference in required_items(object, tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE)? {
            for study in required_items(frame_of_reference, tags::RT_REFERENCED_STUDY_SEQUENCE)? {
                for series in required_items(study, tags::RT_REFERENCED_SERIES_SEQUENCE)? {
                    if required_string(series, tags::SERIES_INSTANCE_UID)? != series_instance_uid {
                        continue;
                    }
                    return required_items(series, tags::CONTOUR_IMAGE_SEQUENCE)?
                        .iter()
                        .map(|image| required_string(image, tags::REFERENCED_SOP_INSTANCE_UID))
                        .collect();
                }
            }
        }
        Ok(HashSet::new())
    }

    fn extract_roi(item: &InMemDicomObject, file: &StructFile<'_>) -> Result<RoiExtraction, ValidationError> {
        let roi_number = required_string(item, tags::REFERENCED_ROI_NUMBER)?;
        let uid = file.roi_uid(&roi_number);
        let color = floats(item, tags::ROI_DISPLAY_COLOR)
            .and_then(|rgb| <[f64; 3]>::try_from(rgb).ok())
            .map(|rgb| rgb.map(|c| c.clamp(0.0, 255.0) as u8));
        let mut extraction = RoiExtraction {
            name: file.roi_name(&roi_number),
            uid,
            color,
            polygons: Vec::new(),
            diagnostics: Vec::new(),
        };

        let contours = items(item, tags::CONTOUR_SEQUENCE).unwrap_or_default();
        for (index, contour) in contours.iter().enumerate() {
            let contour_number =
                string(contour, tags::CONTOUR_NUMBER).unwrap_or_else(|| (index + 1).to_string());
            let polygon_uid = format!("{}.{}.{}", file.sop_instance_uid, roi_number, contour_number);
            match Self::extract_contour(contour, file, &extraction.uid, polygon_uid)? {
                Ok(polygon) => extraction.polygons.push(polygon),
                Err(diagnostic) => {
                    warn!(roi = %extraction.uid, "{diagnostic}");
                    extraction.diagnostics.push(diagnostic);
                }
            }
        }
        debug!(
            roi = %extraction.uid,
            polygons = extraction.polygons.len(),
            "extracted ROI contour"
        );
        Ok(extraction)
    }

    /// Outer error aborts the decode, inner error skips the contour.
    fn extract_contour(
        contour: &InMemDicomObject,
        file: &StructFile<'_>,
        roi_contour_uid: &str,
        polygon_uid: String,
    ) -> Result<Result<Polygon, Diagnostic>, ValidationError> {
        let geometric_type = required_string(contour, tags::CONTOUR_GEOMETRIC_TYPE)?;
        if ContourGeometricType::from_code(&geometric_type) != Some(ContourGeometricType::ClosedPlanar) {
            return Ok(Err(Diagnostic::UnsupportedGeometry {
                contour: polygon_uid,
                geometric_type,
            }));
        }

        let image = first_item(contour, tags::CONTOUR_IMAGE_SEQUENCE);
        let referenced = image.and_then(|image| string(image, tags::REFERENCED_SOP_INSTANCE_UID));
        let Some(referenced_sop_instance_uid) = referenced.filter(|uid| file.members.contains(uid))
        else {
            return Ok(Err(Diagnostic::ReferenceMismatch {
                contour: polygon_uid,
                sop_instance_uid: image
                    .and_then(|image| string(image, tags::REFERENCED_SOP_INSTANCE_UID))
                    .unwrap_or_default(),
            }));
        };
        let referenced_frame_number = image.and_then(|image| uint(image, tags::REFERENCED_FRAME_NUMBER));

        let points = Self::extract_points(contour)?;

        Ok(Ok(Polygon {
            points,
            referenced_sop_instance_uid,
            series_instance_uid: file.series_instance_uid.to_string(),
            structure_set_label: file.collection_label.to_string(),
            roi_contour_uid: roi_contour_uid.to_string(),
            uid: polygon_uid,
            referenced_frame_number,
        }))
    }

    /// Read Number of Contour Points records of (x, y, z) from Contour Data.
    fn extract_points(contour: &InMemDicomObject) -> Result<Vec<Point3>, ValidationError> {
        let count = required_uint(contour, tags::NUMBER_OF_CONTOUR_POINTS)? as usize;
        let values = required_floats(contour, tags::CONTOUR_DATA)?;
        if values.len() != count * 3 {
            return Err(ValidationError::InvalidAttribute {
                name: "ContourData",
                reason: format!("holds {} values for {count} points", values.len()),
            });
        }
        Ok(values
            .chunks_exact(3)
            .map(|xyz| Point3::new(xyz[0], xyz[1], xyz[2]))
            .collect())
    }
}
