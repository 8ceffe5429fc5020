//! Encoding of ROI masks as a DICOM Segmentation object.

use crate::anatomy;
use crate::config::ExportOptions;
use crate::enums::PixelPacking;
use crate::error::EncodeError;
use crate::geometry::SeriesMetadata;
use crate::mask::Mask;
use crate::model::SegmentDescriptor;
use crate::tags;
use dicom::core::value::DataSetSequence;
use dicom::core::{DataElement, Length, PrimitiveValue, Tag, VR};
use dicom::object::mem::InMemElement;
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::uids;
use tracing::{info, warn};
use uuid::Uuid;

/// Masks of one ROI together with the metadata it is exported under.
#[derive(Debug, Clone)]
pub struct Segment {
    pub descriptor: SegmentDescriptor,
    /// Display colour as sRGB.
    pub color: Option<[u8; 3]>,
    pub masks: Vec<Mask>,
}

/// One encoded frame: a mask and the 1-based segment it belongs to.
struct Frame<'a> {
    segment_number: u16,
    slice_index: usize,
    mask: &'a Mask,
}

/// Create a UID under the `2.25` UUID-derived root.
pub fn generate_uid() -> String {
    format!("2.25.{}", Uuid::new_v4().as_u128())
}

pub struct DicomSegWriter<'a> {
    series: &'a SeriesMetadata,
    options: &'a ExportOptions,
}

impl<'a> DicomSegWriter<'a> {
    pub fn new(series: &'a SeriesMetadata, options: &'a ExportOptions) -> Self {
        Self { series, options }
    }

    /// Encode `segments` as a Segmentation file, preamble included.
    ///
    /// Frames are ordered by segment and, within a segment, by slice
    /// position in the source series.
    ///
    /// # Errors
    ///
    /// Fails when a segment lacks its category or type code, when a mask
    /// does not match the series grid or references a foreign instance, or
    /// when there is no frame to encode.
    pub fn write(&self, segments: &[Segment]) -> Result<Vec<u8>, EncodeError> {
        let frames = self.validate(segments)?;
        let geometry = &self.series.geometry;
        let rows = u16::try_from(geometry.rows).map_err(|_| EncodeError::GridTooLarge(geometry.rows, geometry.columns))?;
        let columns =
            u16::try_from(geometry.columns).map_err(|_| EncodeError::GridTooLarge(geometry.rows, geometry.columns))?;

        let sop_instance_uid = generate_uid();
        let mut object = self.header(&sop_instance_uid, rows, columns, frames.len());
        object.put(sequence(
            tags::SEGMENT_SEQUENCE,
            segments
                .iter()
                .zip(1..=u16::MAX)
                .map(|(segment, number)| self.segment_item(number, segment))
                .collect(),
        ));
        object.put(sequence(tags::SHARED_FUNCTIONAL_GROUPS_SEQUENCE, vec![self.shared_functional_groups()]));
        object.put(sequence(
            tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE,
            frames.iter().map(|frame| self.frame_functional_groups(frame)).collect(),
        ));
        object.put(DataElement::new(
            tags::PIXEL_DATA,
            VR::OB,
            PrimitiveValue::from(pack_frames(&frames, self.options.packing)),
        ));

        let meta = FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::SEGMENTATION_STORAGE)
            .media_storage_sop_instance_uid(sop_instance_uid.as_str())
            .build()
            .map_err(|e| EncodeError::FileMeta(e.to_string()))?;

        let mut buffer = Vec::new();
        object.with_exact_meta(meta).write_all(&mut buffer)?;
        info!(
            sop_instance_uid = %sop_instance_uid,
            segments = segments.len(),
            frames = frames.len(),
            bytes = buffer.len(),
            "encoded segmentation"
        );
        Ok(buffer)
    }

    fn validate<'s>(&self, segments: &'s [Segment]) -> Result<Vec<Frame<'s>>, EncodeError> {
        let geometry = &self.series.geometry;
        if segments.len() > usize::from(u16::MAX) {
            return Err(EncodeError::TooManySegments(segments.len()));
        }
        let mut frames = Vec::new();
        for (segment, segment_number) in segments.iter().zip(1..=u16::MAX) {
            let descriptor = &segment.descriptor;
            for (code, value) in [
                ("category", &descriptor.category_code),
                ("type", &descriptor.type_code),
            ] {
                if value.as_deref().is_none_or(str::is_empty) {
                    return Err(EncodeError::MissingCode {
                        segment: descriptor.label.clone(),
                        code,
                    });
                }
            }

            if segment.masks.is_empty() {
                warn!(segment = %descriptor.label, "segment has no frames");
            }
            let mut segment_frames = Vec::with_capacity(segment.masks.len());
            for mask in &segment.masks {
                if mask.dim() != geometry.dim() {
                    return Err(EncodeError::DimensionMismatch {
                        expected: geometry.dim(),
                        actual: mask.dim(),
                    });
                }
                let slice_index = geometry
                    .slice_index(&mask.sop_instance_uid)
                    .ok_or_else(|| EncodeError::UnknownSlice(mask.sop_instance_uid.clone()))?;
                segment_frames.push(Frame {
                    segment_number,
                    slice_index,
                    mask,
                });
            }
            segment_frames.sort_by_key(|frame| frame.slice_index);
            frames.extend(segment_frames);
        }
        if frames.is_empty() {
            return Err(EncodeError::NoFrames);
        }
        Ok(frames)
    }

    fn header(&self, sop_instance_uid: &str, rows: u16, columns: u16, frame_count: usize) -> InMemDicomObject {
        let series = self.series;
        let options = self.options;
        let now = chrono::Local::now();
        let dimension_organization_uid = generate_uid();

        let mut object = InMemDicomObject::from_element_iter([
            text(tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 192"),
            texts(tags::IMAGE_TYPE, VR::CS, ["DERIVED", "PRIMARY"]),
            text(tags::SOP_CLASS_UID, VR::UI, uids::SEGMENTATION_STORAGE),
            text(tags::SOP_INSTANCE_UID, VR::UI, sop_instance_uid),
            text(tags::STUDY_DATE, VR::DA, series.study_date.clone().unwrap_or_default()),
            text(tags::CONTENT_DATE, VR::DA, now.format("%Y%m%d").to_string()),
            text(tags::CONTENT_TIME, VR::TM, now.format("%H%M%S").to_string()),
            text(tags::MODALITY, VR::CS, "SEG"),
            text(tags::MANUFACTURER, VR::LO, options.manufacturer.as_str()),
            text(tags::SERIES_DESCRIPTION, VR::LO, options.series_description.as_str()),
            sequence(
                tags::REFERENCED_SERIES_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([
                    text(tags::SERIES_INSTANCE_UID, VR::UI, series.series_instance_uid.as_str()),
                    sequence(tags::REFERENCED_INSTANCE_SEQUENCE, self.referenced_instances()),
                ])],
            ),
            text(tags::PATIENT_NAME, VR::PN, series.patient_name.clone().unwrap_or_default()),
            text(tags::PATIENT_ID, VR::LO, series.patient_id.clone().unwrap_or_default()),
            text(tags::STUDY_INSTANCE_UID, VR::UI, series.study_instance_uid.as_str()),
            text(tags::SERIES_INSTANCE_UID, VR::UI, generate_uid()),
            text(tags::SERIES_NUMBER, VR::IS, options.series_number.to_string()),
            text(tags::INSTANCE_NUMBER, VR::IS, "1"),
            sequence(
                tags::DIMENSION_ORGANIZATION_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([text(
                    tags::DIMENSION_ORGANIZATION_UID,
                    VR::UI,
                    dimension_organization_uid.as_str(),
                )])],
            ),
            sequence(
                tags::DIMENSION_INDEX_SEQUENCE,
                vec![
                    dimension_index(
                        tags::REFERENCED_SEGMENT_NUMBER,
                        tags::SEGMENT_IDENTIFICATION_SEQUENCE,
                        &dimension_organization_uid,
                    ),
                    dimension_index(
                        tags::IMAGE_POSITION_PATIENT,
                        tags::PLANE_POSITION_SEQUENCE,
                        &dimension_organization_uid,
                    ),
                ],
            ),
            DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
            text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"),
            text(tags::NUMBER_OF_FRAMES, VR::IS, frame_count.to_string()),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)),
            DataElement::new(
                tags::BITS_ALLOCATED,
                VR::US,
                PrimitiveValue::from(options.packing.bits_allocated()),
            ),
            DataElement::new(
                tags::BITS_STORED,
                VR::US,
                PrimitiveValue::from(options.packing.bits_allocated()),
            ),
            DataElement::new(
                tags::HIGH_BIT,
                VR::US,
                PrimitiveValue::from(options.packing.bits_allocated() - 1),
            ),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
            text(tags::LOSSY_IMAGE_COMPRESSION, VR::CS, "00"),
            text(tags::CONTENT_LABEL, VR::CS, options.content_label.as_str()),
            text(tags::CONTENT_DESCRIPTION, VR::LO, options.series_description.as_str()),
            text(
                tags::CONTENT_CREATOR_NAME,
                VR::PN,
                options.content_creator_name.clone().unwrap_or_default(),
            ),
        ]);

        if let Some(frame_of_reference_uid) = &series.frame_of_reference_uid {
            object.put(text(tags::FRAME_OF_REFERENCE_UID, VR::UI, frame_of_reference_uid.as_str()));
        }
        match options.packing {
            PixelPacking::Bit => {
                object.put(text(tags::SEGMENTATION_TYPE, VR::CS, "BINARY"));
            }
            PixelPacking::Byte => {
                object.put(text(tags::SEGMENTATION_TYPE, VR::CS, "FRACTIONAL"));
                object.put(text(tags::SEGMENTATION_FRACTIONAL_TYPE, VR::CS, "PROBABILITY"));
                object.put(DataElement::new(
                    tags::MAXIMUM_FRACTIONAL_VALUE,
                    VR::US,
                    PrimitiveValue::from(u16::from(u8::MAX)),
                ));
            }
        }
        object
    }

    fn referenced_instances(&self) -> Vec<InMemDicomObject> {
        self.series
            .geometry
            .slices
            .iter()
            .map(|slice| {
                InMemDicomObject::from_element_iter([
                    text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, self.series.sop_class_uid.as_str()),
                    text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, slice.sop_instance_uid.as_str()),
                ])
            })
            .collect()
    }

    fn segment_item(&self, number: u16, segment: &Segment) -> InMemDicomObject {
        let descriptor = &segment.descriptor;
        let category = descriptor.category_code.as_deref().unwrap_or(anatomy::DEFAULT_CODE);
        let type_code = descriptor.type_code.as_deref().unwrap_or(anatomy::DEFAULT_CODE);

        let mut type_item = code_item(type_code);
        if let Some(modifier) = descriptor.modifier_code.as_deref().filter(|m| !m.is_empty()) {
            type_item.put(sequence(
                tags::SEGMENTED_PROPERTY_TYPE_MODIFIER_CODE_SEQUENCE,
                vec![code_item(modifier)],
            ));
        }

        let mut item = InMemDicomObject::from_element_iter([
            DataElement::new(tags::SEGMENT_NUMBER, VR::US, PrimitiveValue::from(number)),
            text(tags::SEGMENT_LABEL, VR::LO, descriptor.label.as_str()),
            text(tags::SEGMENT_ALGORITHM_TYPE, VR::CS, self.options.algorithm_type.as_str()),
            sequence(tags::SEGMENTED_PROPERTY_CATEGORY_CODE_SEQUENCE, vec![code_item(category)]),
            sequence(tags::SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE, vec![type_item]),
        ]);
        if self.options.algorithm_type != "MANUAL" {
            item.put(text(tags::SEGMENT_ALGORITHM_NAME, VR::LO, self.options.manufacturer.as_str()));
        }
        if let Some(color) = segment.color {
            item.put(DataElement::new(
                tags::RECOMMENDED_DISPLAY_CIE_LAB_VALUE,
                VR::US,
                PrimitiveValue::U16(rgb_to_dicom_lab(color).into_iter().collect()),
            ));
        }
        item
    }

    fn shared_functional_groups(&self) -> InMemDicomObject {
        let geometry = &self.series.geometry;
        let mut pixel_measures = InMemDicomObject::from_element_iter([decimals(tags::PIXEL_SPACING, &geometry.pixel_spacing)]);
        if let Some(thickness) = geometry.slice_thickness {
            pixel_measures.put(decimals(tags::SLICE_THICKNESS, &[thickness]));
        }
        InMemDicomObject::from_element_iter([
            sequence(
                tags::PLANE_ORIENTATION_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([decimals(
                    tags::IMAGE_ORIENTATION_PATIENT,
                    &geometry.image_orientation,
                )])],
            ),
            sequence(tags::PIXEL_MEASURES_SEQUENCE, vec![pixel_measures]),
        ])
    }

    fn frame_functional_groups(&self, frame: &Frame<'_>) -> InMemDicomObject {
        let slice = &self.series.geometry.slices[frame.slice_index];
        let source_image = InMemDicomObject::from_element_iter([
            text(tags::REFERENCED_SOP_CLASS_UID, VR::UI, self.series.sop_class_uid.as_str()),
            text(tags::REFERENCED_SOP_INSTANCE_UID, VR::UI, slice.sop_instance_uid.as_str()),
            sequence(
                tags::PURPOSE_OF_REFERENCE_CODE_SEQUENCE,
                vec![dcm_code("121322", "Source image for image processing operation")],
            ),
        ]);
        let derivation_image = InMemDicomObject::from_element_iter([
            sequence(tags::SOURCE_IMAGE_SEQUENCE, vec![source_image]),
            sequence(tags::DERIVATION_CODE_SEQUENCE, vec![dcm_code("113076", "Segmentation")]),
        ]);

        InMemDicomObject::from_element_iter([
            sequence(tags::DERIVATION_IMAGE_SEQUENCE, vec![derivation_image]),
            sequence(
                tags::FRAME_CONTENT_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([DataElement::new(
                    tags::DIMENSION_INDEX_VALUES,
                    VR::UL,
                    PrimitiveValue::U32([u32::from(frame.segment_number), frame.slice_index as u32 + 1].into_iter().collect()),
                )])],
            ),
            sequence(
                tags::PLANE_POSITION_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([decimals(
                    tags::IMAGE_POSITION_PATIENT,
                    &slice.image_position,
                )])],
            ),
            sequence(
                tags::SEGMENT_IDENTIFICATION_SEQUENCE,
                vec![InMemDicomObject::from_element_iter([DataElement::new(
                    tags::REFERENCED_SEGMENT_NUMBER,
                    VR::US,
                    PrimitiveValue::from(frame.segment_number),
                )])],
            ),
        ])
    }
}

/// Concatenate frames into pixel data, padded to an even length.
///
/// With one bit per pixel, frames follow each other in the bit stream with
/// no padding in between; the first pixel is the least significant bit.
fn pack_frames(frames: &[Frame<'_>], packing: PixelPacking) -> Vec<u8> {
    let pixels = frames.iter().flat_map(|frame| frame.mask.grid.iter().copied());
    let mut data = match packing {
        PixelPacking::Bit => {
            let total: usize = frames.iter().map(|frame| frame.mask.grid.len()).sum();
            let mut data = vec![0_u8; total.div_ceil(8)];
            for (i, inside) in pixels.enumerate() {
                if inside {
                    data[i / 8] |= 1 << (i % 8);
                }
            }
            data
        }
        PixelPacking::Byte => pixels.map(|inside| if inside { u8::MAX } else { 0 }).collect(),
    };
    if data.len() % 2 == 1 {
        data.push(0);
    }
    data
}

/// sRGB to CIELab (D65), scaled to the unsigned 16-bit range DICOM uses.
pub fn rgb_to_dicom_lab(rgb: [u8; 3]) -> [u16; 3] {
    let linear = |c: u8| {
        let c = f64::from(c) / 255.0;
        if c <= 0.04045 {
            c / 12.92
        } else {
            ((c + 0.055) / 1.055).powf(2.4)
        }
    };
    let (r, g, b) = (linear(rgb[0]), linear(rgb[1]), linear(rgb[2]));
    let x = (0.4124 * r + 0.3576 * g + 0.1805 * b) / 0.95047;
    let y = 0.2126 * r + 0.7152 * g + 0.0722 * b;
    let z = (0.0193 * r + 0.1192 * g + 0.9505 * b) / 1.08883;

    let f = |t: f64| {
        if t > 216.0 / 24389.0 {
            t.cbrt()
        } else {
            (24389.0 / 27.0 * t + 16.0) / 116.0
        }
    };
    let (fx, fy, fz) = (f(x), f(y), f(z));
    let l = 116.0 * fy - 16.0;
    let a = 500.0 * (fx - fy);
    let b = 200.0 * (fy - fz);

    let scale = |v: f64| v.round().clamp(0.0, 65535.0) as u16;
    [
        scale(l * 65535.0 / 100.0),
        scale((a + 128.0) * 65535.0 / 255.0),
        scale((b + 128.0) * 65535.0 / 255.0),
    ]
}

fn text(tag: Tag, vr: VR, value: impl Into<String>) -> InMemElement {
    DataElement::new(tag, vr, PrimitiveValue::from(value.into()))
}

fn texts<S: Into<String>>(tag: Tag, vr: VR, values: impl IntoIterator<Item = S>) -> InMemElement {
    DataElement::new(
        tag,
        vr,
        PrimitiveValue::Strs(values.into_iter().map(Into::into).collect()),
    )
}

fn decimals(tag: Tag, values: &[f64]) -> InMemElement {
    texts(tag, VR::DS, values.iter().map(|v| format_decimal(*v)))
}

fn sequence(tag: Tag, items: Vec<InMemDicomObject>) -> InMemElement {
    DataElement::new(tag, VR::SQ, DataSetSequence::new(items, Length::UNDEFINED))
}

fn code_item(value: &str) -> InMemDicomObject {
    if anatomy::lookup(value).is_none() {
        warn!(code = value, "code value is not in the anatomy table");
    }
    InMemDicomObject::from_element_iter([
        text(tags::CODE_VALUE, VR::SH, value),
        text(tags::CODING_SCHEME_DESIGNATOR, VR::SH, anatomy::CODING_SCHEME_DESIGNATOR),
        text(tags::CODE_MEANING, VR::LO, anatomy::meaning(value)),
    ])
}

fn dcm_code(value: &str, meaning: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        text(tags::CODE_VALUE, VR::SH, value),
        text(tags::CODING_SCHEME_DESIGNATOR, VR::SH, "DCM"),
        text(tags::CODE_MEANING, VR::LO, meaning),
    ])
}

fn dimension_index(pointer: Tag, group: Tag, organization_uid: &str) -> InMemDicomObject {
    InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::DIMENSION_INDEX_POINTER,
            VR::AT,
            PrimitiveValue::Tags(std::iter::once(pointer).collect()),
        ),
        DataElement::new(
            tags::FUNCTIONAL_GROUP_POINTER,
            VR::AT,
            PrimitiveValue::Tags(std::iter::once(group).collect()),
        ),
        text(tags::DIMENSION_ORGANIZATION_UID, VR::UI, organization_uid),
    ])
}

/// Format a Decimal String value within its 16 character limit.
fn format_decimal(value: f64) -> String {
    let plain = value.to_string();
    if plain.len() <= 16 {
        return plain;
    }
    for precision in (0..=12).rev() {
        let fixed = format!("{value:.precision$}");
        let fixed = if fixed.contains('.') {
            fixed.trim_end_matches('0').trim_end_matches('.').to_string()
        } else {
            fixed
        };
        if fixed.len() <= 16 {
            return fixed;
        }
    }
    format!("{value:.6e}")
}
