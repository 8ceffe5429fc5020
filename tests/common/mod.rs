#![allow(dead_code)]

use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::uids;
use dicom_rtstruct_seg::tags;
use dicom_rtstruct_seg::{SeriesGeometry, SeriesMetadata, SliceGeometry};

pub const SERIES_UID: &str = "1.2.826.0.1.3680043.8.498.1";
pub const STUDY_UID: &str = "1.2.826.0.1.3680043.8.498.2";
pub const STRUCT_SOP_UID: &str = "1.2.826.0.1.3680043.8.498.3";
pub const ROWS: usize = 32;
pub const COLUMNS: usize = 32;

/// SOP Instance UIDs of the fixture series, at z = 0, 5 and 10.
pub const SLICES: [&str; 3] = [
    "1.2.826.0.1.3680043.8.498.10",
    "1.2.826.0.1.3680043.8.498.11",
    "1.2.826.0.1.3680043.8.498.12",
];

/// Axial series with 1 mm pixels whose first pixel sits at the patient
/// origin, so patient (x, y) equals pixel (column, row).
pub fn series_metadata() -> SeriesMetadata {
    SeriesMetadata {
        series_instance_uid: SERIES_UID.to_string(),
        study_instance_uid: STUDY_UID.to_string(),
        frame_of_reference_uid: Some("1.2.826.0.1.3680043.8.498.4".to_string()),
        sop_class_uid: uids::CT_IMAGE_STORAGE.to_string(),
        patient_name: Some("Doe^Jane".to_string()),
        patient_id: Some("P-001".to_string()),
        study_date: Some("20240102".to_string()),
        geometry: SeriesGeometry {
            rows: ROWS,
            columns: COLUMNS,
            pixel_spacing: [1.0, 1.0],
            image_orientation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            slice_thickness: Some(5.0),
            slices: SLICES
                .iter()
                .enumerate()
                .map(|(i, sop)| SliceGeometry {
                    sop_instance_uid: sop.to_string(),
                    image_position: [0.0, 0.0, 5.0 * i as f64],
                })
                .collect(),
        },
    }
}

pub struct Contour {
    pub geometric_type: &'static str,
    pub referenced_sop_instance_uid: Option<String>,
    pub points: Vec<[f64; 3]>,
    /// Number of Contour Points to write instead of the actual count.
    pub declared_points: Option<usize>,
}

impl Contour {
    pub fn closed(slice: usize, points: &[(f64, f64)]) -> Self {
        Self {
            geometric_type: "CLOSED_PLANAR",
            referenced_sop_instance_uid: Some(SLICES[slice].to_string()),
            points: points.iter().map(|&(x, y)| [x, y, 5.0 * slice as f64]).collect(),
            declared_points: None,
        }
    }

    /// Axis-aligned square with corners at `min` and `max` on both axes.
    pub fn square(slice: usize, min: f64, max: f64) -> Self {
        Self::closed(slice, &[(min, min), (min, max), (max, max), (max, min)])
    }

    pub fn with_type(mut self, geometric_type: &'static str) -> Self {
        self.geometric_type = geometric_type;
        self
    }

    pub fn referencing(mut self, sop_instance_uid: &str) -> Self {
        self.referenced_sop_instance_uid = Some(sop_instance_uid.to_string());
        self
    }

    pub fn declaring_points(mut self, count: usize) -> Self {
        self.declared_points = Some(count);
        self
    }
}

pub struct Roi {
    pub number: u32,
    pub color: Option<[u8; 3]>,
    pub contours: Vec<Contour>,
}

impl Roi {
    pub fn new(number: u32, contours: Vec<Contour>) -> Self {
        Self {
            number,
            color: None,
            contours,
        }
    }

    pub fn with_color(mut self, color: [u8; 3]) -> Self {
        self.color = Some(color);
        self
    }
}

/// Builder for synthetic RT Structure Set files.
pub struct RtStructBuilder {
    sop_class_uid: String,
    label: String,
    name: Option<String>,
    referenced_series_uid: String,
    rois: Vec<Roi>,
    omitted: Vec<Tag>,
}

impl RtStructBuilder {
    pub fn new() -> Self {
        Self {
            sop_class_uid: uids::RT_STRUCTURE_SET_STORAGE.to_string(),
            label: "RTSTRUCT".to_string(),
            name: Some("Liver".to_string()),
            referenced_series_uid: SERIES_UID.to_string(),
            rois: Vec::new(),
            omitted: Vec::new(),
        }
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    /// Leave a top-level attribute out of the file.
    pub fn without(mut self, tag: Tag) -> Self {
        self.omitted.push(tag);
        self
    }

    pub fn sop_class_uid(mut self, uid: &str) -> Self {
        self.sop_class_uid = uid.to_string();
        self
    }

    pub fn referenced_series(mut self, uid: &str) -> Self {
        self.referenced_series_uid = uid.to_string();
        self
    }

    pub fn roi(mut self, roi: Roi) -> Self {
        self.rois.push(roi);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let contour_images = SLICES
            .iter()
            .map(|sop| {
                InMemDicomObject::from_element_iter([
                    text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE),
                    text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, sop),
                ])
            })
            .collect();
        let series = InMemDicomObject::from_element_iter([
            text(tags::SERIES_INSTANCE_UID, VR::UI, &self.referenced_series_uid),
            sequence(tags::CONTOUR_IMAGE_SEQUENCE, contour_images),
        ]);
        let study = InMemDicomObject::from_element_iter([sequence(tags::RT_REFERENCED_SERIES_SEQUENCE, vec![series])]);
        let frame_of_reference =
            InMemDicomObject::from_element_iter([sequence(tags::RT_REFERENCED_STUDY_SEQUENCE, vec![study])]);

        let mut object = InMemDicomObject::from_element_iter([
            text(tags::SOP_CLASS_UID, VR::UI, &self.sop_class_uid),
            text(tags::SOP_INSTANCE_UID, VR::UI, STRUCT_SOP_UID),
            text(tags::STUDY_INSTANCE_UID, VR::UI, STUDY_UID),
            text(tags::MODALITY, VR::CS, "RTSTRUCT"),
            text(tags::STRUCTURE_SET_LABEL, VR::SH, &self.label),
            sequence(tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE, vec![frame_of_reference]),
            sequence(tags::ROI_CONTOUR_SEQUENCE, self.rois.iter().map(roi_item).collect()),
        ]);
        if let Some(name) = &self.name {
            object.put(text(tags::STRUCTURE_SET_NAME, VR::LO, name));
        }
        for tag in &self.omitted {
            object.remove_element(*tag);
        }

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(self.sop_class_uid.as_str())
            .media_storage_sop_instance_uid(STRUCT_SOP_UID)
            .build()
            .expect("valid file meta");
        let mut buffer = Vec::new();
        object
            .with_exact_meta(meta)
            .write_all(&mut buffer)
            .expect("fixture should serialize");
        buffer
    }
}

fn roi_item(roi: &Roi) -> InMemDicomObject {
    let mut item = InMemDicomObject::from_element_iter([
        text(tags::REFERENCED_ROI_NUMBER, VR::IS, &roi.number.to_string()),
        sequence(
            tags::CONTOUR_SEQUENCE,
            roi.contours
                .iter()
                .enumerate()
                .map(|(i, contour)| contour_item(i + 1, contour))
                .collect(),
        ),
    ]);
    if let Some(color) = roi.color {
        item.put(DataElement::new(
            tags::ROI_DISPLAY_COLOR,
            VR::IS,
            PrimitiveValue::Strs(color.iter().map(|c| c.to_string()).collect()),
        ));
    }
    item
}

fn contour_item(number: usize, contour: &Contour) -> InMemDicomObject {
    let mut item = InMemDicomObject::from_element_iter([
        text(tags::CONTOUR_NUMBER, VR::IS, &number.to_string()),
        text(tags::CONTOUR_GEOMETRIC_TYPE, VR::CS, contour.geometric_type),
        text(
            tags::NUMBER_OF_CONTOUR_POINTS,
            VR::IS,
            &contour.declared_points.unwrap_or(contour.points.len()).to_string(),
        ),
        DataElement::new(
            tags::CONTOUR_DATA,
            VR::DS,
            PrimitiveValue::Strs(contour.points.iter().flatten().map(|v| v.to_string()).collect()),
        ),
    ]);
    if let Some(sop) = &contour.referenced_sop_instance_uid {
        item.put(sequence(
            tags::CONTOUR_IMAGE_SEQUENCE,
            vec![InMemDicomObject::from_element_iter([
                text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE),
                text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, sop),
            ])],
        ));
    }
    item
}

fn text(tag: Tag, vr: VR, value: &str) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::new(items, Length::UNDEFINED))
}
