//! Attribute tags for the RT Structure Set and Segmentation subsets.
//!
//! The constants are those of the standard dictionary. [`lookup`] and
//! [`keyword`] resolve keywords at run time, which is what diagnostics and
//! error messages use to name attributes.

use dicom::core::Tag;
use dicom::core::dictionary::DataDictionary;
use dicom_dictionary_std::StandardDataDictionary;

pub use dicom_dictionary_std::tags::{
    // General
    CODE_MEANING, CODE_VALUE, CODING_SCHEME_DESIGNATOR, CONTENT_DATE, CONTENT_TIME,
    DERIVATION_CODE_SEQUENCE, DERIVATION_IMAGE_SEQUENCE, IMAGE_TYPE, MANUFACTURER, MODALITY,
    REFERENCED_FRAME_NUMBER, REFERENCED_INSTANCE_SEQUENCE, REFERENCED_SERIES_SEQUENCE,
    REFERENCED_SOP_CLASS_UID, REFERENCED_SOP_INSTANCE_UID, SERIES_DESCRIPTION, SOP_CLASS_UID,
    SOP_INSTANCE_UID, SOURCE_IMAGE_SEQUENCE, SPECIFIC_CHARACTER_SET, STUDY_DATE,
    // Patient, study and series
    DIMENSION_INDEX_POINTER, DIMENSION_INDEX_SEQUENCE, DIMENSION_INDEX_VALUES,
    DIMENSION_ORGANIZATION_SEQUENCE, DIMENSION_ORGANIZATION_UID, FRAME_CONTENT_SEQUENCE,
    FRAME_OF_REFERENCE_UID, FUNCTIONAL_GROUP_POINTER, IMAGE_ORIENTATION_PATIENT,
    IMAGE_POSITION_PATIENT, INSTANCE_NUMBER, PATIENT_ID, PATIENT_NAME, PLANE_ORIENTATION_SEQUENCE,
    PLANE_POSITION_SEQUENCE, SERIES_INSTANCE_UID, SERIES_NUMBER, SLICE_THICKNESS,
    STUDY_INSTANCE_UID,
    // Image pixel
    BITS_ALLOCATED, BITS_STORED, COLUMNS, HIGH_BIT, LOSSY_IMAGE_COMPRESSION, NUMBER_OF_FRAMES,
    PHOTOMETRIC_INTERPRETATION, PIXEL_DATA, PIXEL_MEASURES_SEQUENCE, PIXEL_REPRESENTATION,
    PIXEL_SPACING, ROWS, SAMPLES_PER_PIXEL,
    // Segmentation
    CONTENT_CREATOR_NAME, CONTENT_DESCRIPTION, CONTENT_LABEL, MAXIMUM_FRACTIONAL_VALUE,
    PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE, PURPOSE_OF_REFERENCE_CODE_SEQUENCE,
    RECOMMENDED_DISPLAY_CIE_LAB_VALUE, REFERENCED_SEGMENT_NUMBER, SEGMENT_ALGORITHM_NAME,
    SEGMENT_ALGORITHM_TYPE, SEGMENT_IDENTIFICATION_SEQUENCE, SEGMENT_LABEL, SEGMENT_NUMBER,
    SEGMENT_SEQUENCE, SEGMENTATION_FRACTIONAL_TYPE, SEGMENTATION_TYPE,
    SEGMENTED_PROPERTY_CATEGORY_CODE_SEQUENCE, SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE,
    SEGMENTED_PROPERTY_TYPE_MODIFIER_CODE_SEQUENCE, SHARED_FUNCTIONAL_GROUPS_SEQUENCE,
    // RT Structure Set
    CONTOUR_DATA, CONTOUR_GEOMETRIC_TYPE, CONTOUR_IMAGE_SEQUENCE, CONTOUR_NUMBER,
    CONTOUR_SEQUENCE, NUMBER_OF_CONTOUR_POINTS, REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
    REFERENCED_ROI_NUMBER, ROI_CONTOUR_SEQUENCE, ROI_DISPLAY_COLOR, RT_REFERENCED_SERIES_SEQUENCE,
    RT_REFERENCED_STUDY_SEQUENCE, STRUCTURE_SET_LABEL, STRUCTURE_SET_NAME,
};

/// Resolve an attribute keyword to its tag.
pub fn lookup(keyword: &str) -> Option<Tag> {
    StandardDataDictionary
        .by_name(keyword)
        .map(|entry| entry.tag.inner())
}

/// Resolve a tag back to its attribute keyword.
pub fn keyword(tag: Tag) -> Option<&'static str> {
    StandardDataDictionary.by_tag(tag).map(|entry| entry.alias)
}
