//! Reading of DICOM Segmentation objects back into masks.

use crate::attributes::{
    first_item, items, name_of, read_buffer, required_items, required_string, required_uint,
    string, uint,
};
use crate::error::{DecodeError, ValidationError};
use crate::model::SegmentDescriptor;
use crate::tags;
use dicom::core::Tag;
use dicom::object::InMemDicomObject;
use dicom_dictionary_std::uids;
use ndarray::Array2;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfo {
    pub number: u16,
    pub descriptor: SegmentDescriptor,
    /// Recommended Display CIELab Value as stored.
    pub cielab: Option<[u16; 3]>,
}

/// One decoded frame of the pixel data.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentFrame {
    pub segment_number: u16,
    /// Source image the frame was derived from.
    pub sop_instance_uid: Option<String>,
    pub grid: Array2<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    /// Series the segmentation was derived from.
    pub referenced_series_instance_uid: Option<String>,
    pub rows: usize,
    pub columns: usize,
    pub segments: Vec<SegmentInfo>,
    pub frames: Vec<SegmentFrame>,
}

impl Segmentation {
    pub fn segment(&self, number: u16) -> Option<&SegmentInfo> {
        self.segments.iter().find(|segment| segment.number == number)
    }

    /// Frames of one segment, in pixel data order.
    pub fn frames_of(&self, segment_number: u16) -> impl Iterator<Item = &SegmentFrame> {
        self.frames
            .iter()
            .filter(move |frame| frame.segment_number == segment_number)
    }
}

/// Parse a Segmentation file held in memory.
///
/// # Errors
///
/// Returns [`DecodeError::Parse`] for malformed DICOM and
/// [`DecodeError::Validation`] for a wrong SOP class, a missing attribute or
/// pixel data too short for the announced frames.
pub fn read_segmentation(buffer: &[u8]) -> Result<Segmentation, DecodeError> {
    let object = read_buffer(buffer)?;

    let sop_class_uid = string(&object, tags::SOP_CLASS_UID).unwrap_or_default();
    if sop_class_uid != uids::SEGMENTATION_STORAGE {
        return Err(ValidationError::NotSegmentation {
            found: sop_class_uid,
        }
        .into());
    }

    let rows = required_uint(&object, tags::ROWS)? as usize;
    let columns = required_uint(&object, tags::COLUMNS)? as usize;
    let frame_count = required_uint(&object, tags::NUMBER_OF_FRAMES)? as usize;
    let bits_allocated = required_uint(&object, tags::BITS_ALLOCATED)?;

    let segments = required_items(&object, tags::SEGMENT_SEQUENCE)?
        .iter()
        .map(read_segment)
        .collect::<Result<Vec<_>, _>>()?;

    let per_frame = items(&object, tags::PER_FRAME_FUNCTIONAL_GROUPS_SEQUENCE).unwrap_or_default();
    let pixel_data = object
        .element(tags::PIXEL_DATA)
        .map_err(|_| ValidationError::MissingAttribute {
            name: name_of(tags::PIXEL_DATA),
        })?
        .to_bytes()
        .map_err(|e| ValidationError::InvalidAttribute {
            name: name_of(tags::PIXEL_DATA),
            reason: e.to_string(),
        })?;
    let grids = unpack_frames(&pixel_data, bits_allocated, frame_count, (rows, columns))?;

    let frames = grids
        .into_iter()
        .enumerate()
        .map(|(i, grid)| {
            let groups = per_frame.get(i);
            SegmentFrame {
                segment_number: groups.and_then(referenced_segment_number).unwrap_or(1),
                sop_instance_uid: groups.and_then(source_instance),
                grid,
            }
        })
        .collect::<Vec<_>>();

    debug!(
        segments = segments.len(),
        frames = frames.len(),
        rows,
        columns,
        "read segmentation"
    );

    Ok(Segmentation {
        sop_instance_uid: required_string(&object, tags::SOP_INSTANCE_UID)?,
        series_instance_uid: required_string(&object, tags::SERIES_INSTANCE_UID)?,
        referenced_series_instance_uid: first_item(&object, tags::REFERENCED_SERIES_SEQUENCE)
            .and_then(|item| string(item, tags::SERIES_INSTANCE_UID)),
        rows,
        columns,
        segments,
        frames,
    })
}

fn read_segment(item: &InMemDicomObject) -> Result<SegmentInfo, ValidationError> {
    let number = u16::try_from(required_uint(item, tags::SEGMENT_NUMBER)?).map_err(|e| {
        ValidationError::InvalidAttribute {
            name: name_of(tags::SEGMENT_NUMBER),
            reason: e.to_string(),
        }
    })?;
    let label = string(item, tags::SEGMENT_LABEL).unwrap_or_default();
    let code_of = |tag: Tag| first_item(item, tag).and_then(|code| string(code, tags::CODE_VALUE));
    let modifier_code = first_item(item, tags::SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE)
        .and_then(|type_item| first_item(type_item, tags::SEGMENTED_PROPERTY_TYPE_MODIFIER_CODE_SEQUENCE))
        .and_then(|code| string(code, tags::CODE_VALUE));

    let cielab = item
        .element(tags::RECOMMENDED_DISPLAY_CIE_LAB_VALUE)
        .ok()
        .and_then(|element| element.to_multi_int::<u16>().ok())
        .and_then(|lab| <[u16; 3]>::try_from(lab).ok());

    Ok(SegmentInfo {
        number,
        descriptor: SegmentDescriptor {
            label,
            category_code: code_of(tags::SEGMENTED_PROPERTY_CATEGORY_CODE_SEQUENCE),
            type_code: code_of(tags::SEGMENTED_PROPERTY_TYPE_CODE_SEQUENCE),
            modifier_code,
        },
        cielab,
    })
}

fn referenced_segment_number(groups: &InMemDicomObject) -> Option<u16> {
    let identification = first_item(groups, tags::SEGMENT_IDENTIFICATION_SEQUENCE)?;
    u16::try_from(uint(identification, tags::REFERENCED_SEGMENT_NUMBER)?).ok()
}

fn source_instance(groups: &InMemDicomObject) -> Option<String> {
    let derivation = first_item(groups, tags::DERIVATION_IMAGE_SEQUENCE)?;
    let source = first_item(derivation, tags::SOURCE_IMAGE_SEQUENCE)?;
    string(source, tags::REFERENCED_SOP_INSTANCE_UID)
}

/// Split pixel data into frames of `dim` pixels.
///
/// One bit per pixel is read as a continuous little-endian bit stream; with
/// eight bits any non-zero value counts as inside.
fn unpack_frames(
    data: &[u8],
    bits_allocated: u32,
    frame_count: usize,
    dim: (usize, usize),
) -> Result<Vec<Array2<bool>>, ValidationError> {
    let pixels_per_frame = dim.0 * dim.1;
    let total = pixels_per_frame * frame_count;
    let required = match bits_allocated {
        1 => total.div_ceil(8),
        8 => total,
        other => {
            return Err(ValidationError::InvalidAttribute {
                name: name_of(tags::BITS_ALLOCATED),
                reason: format!("{other} bits per pixel is not supported"),
            });
        }
    };
    if data.len() < required {
        return Err(ValidationError::InvalidAttribute {
            name: name_of(tags::PIXEL_DATA),
            reason: format!("{} bytes cannot hold {frame_count} frames", data.len()),
        });
    }

    let pixel = |i: usize| match bits_allocated {
        1 => (data[i / 8] >> (i % 8)) & 1 == 1,
        _ => data[i] != 0,
    };
    Ok((0..frame_count)
        .map(|frame| {
            let offset = frame * pixels_per_frame;
            Array2::from_shape_fn(dim, |(row, column)| pixel(offset + row * dim.1 + column))
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unpacks_bit_stream_across_frames() {
        let frames = unpack_frames(&[0b0010_0001, 0], 1, 2, (1, 3)).expect("enough data");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].iter().copied().collect::<Vec<_>>(), vec![true, false, false]);
        assert_eq!(frames[1].iter().copied().collect::<Vec<_>>(), vec![false, false, true]);
    }

    #[test]
    fn byte_frames_treat_non_zero_as_inside() {
        let frames = unpack_frames(&[0, 255, 1, 0], 8, 1, (2, 2)).expect("enough data");
        assert_eq!(frames[0].iter().filter(|&&inside| inside).count(), 2);
    }

    #[test]
    fn short_pixel_data_is_rejected() {
        let err = unpack_frames(&[0], 8, 1, (2, 2)).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidAttribute { name: "PixelData", .. }));
    }

    #[test]
    fn rejects_other_sop_classes() {
        let object = InMemDicomObject::from_element_iter([dicom::core::DataElement::new(
            tags::SOP_CLASS_UID,
            dicom::core::VR::UI,
            dicom::core::PrimitiveValue::from(uids::CT_IMAGE_STORAGE),
        )]);
        let meta = dicom::object::FileMetaTableBuilder::new()
            .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
            .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
            .media_storage_sop_instance_uid("1.2.3")
            .build()
            .expect("valid meta");
        let mut buffer = Vec::new();
        object
            .with_exact_meta(meta)
            .write_all(&mut buffer)
            .expect("written");

        let err = read_segmentation(&buffer).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Validation(ValidationError::NotSegmentation { .. })
        ));
    }
}
