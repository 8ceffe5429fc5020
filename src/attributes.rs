//! Small accessors over in-memory data sets.
//!
//! Optional attributes come back as `Option`, mandatory ones as a
//! `ValidationError` naming the missing attribute.

use crate::error::ValidationError;
use crate::tags;
use dicom::core::Tag;
use dicom::object::{DefaultDicomObject, InMemDicomObject, ReadError, from_reader};

const PREAMBLE_LEN: usize = 128;

/// Parse a DICOM file held in memory, with or without its 128-byte preamble.
pub(crate) fn read_buffer(buffer: &[u8]) -> Result<DefaultDicomObject, ReadError> {
    let has_preamble =
        buffer.len() >= PREAMBLE_LEN + 4 && &buffer[PREAMBLE_LEN..PREAMBLE_LEN + 4] == b"DICM";
    if has_preamble {
        from_reader(&buffer[PREAMBLE_LEN..])
    } else {
        from_reader(buffer)
    }
}

pub(crate) fn name_of(tag: Tag) -> &'static str {
    tags::keyword(tag).unwrap_or("(unknown attribute)")
}

/// String value with padding removed; empty values count as absent.
pub(crate) fn string(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = object.element(tag).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    (!value.is_empty()).then(|| value.to_string())
}

pub(crate) fn required_string(object: &InMemDicomObject, tag: Tag) -> Result<String, ValidationError> {
    string(object, tag).ok_or(ValidationError::MissingAttribute { name: name_of(tag) })
}

pub(crate) fn uint(object: &InMemDicomObject, tag: Tag) -> Option<u32> {
    object.element(tag).ok()?.to_int::<u32>().ok()
}

pub(crate) fn required_uint(object: &InMemDicomObject, tag: Tag) -> Result<u32, ValidationError> {
    let element = object
        .element(tag)
        .map_err(|_| ValidationError::MissingAttribute { name: name_of(tag) })?;
    element
        .to_int::<u32>()
        .map_err(|e| ValidationError::InvalidAttribute {
            name: name_of(tag),
            reason: e.to_string(),
        })
}

pub(crate) fn floats(object: &InMemDicomObject, tag: Tag) -> Option<Vec<f64>> {
    object.element(tag).ok()?.to_multi_float64().ok()
}

pub(crate) fn required_floats(object: &InMemDicomObject, tag: Tag) -> Result<Vec<f64>, ValidationError> {
    let element = object
        .element(tag)
        .map_err(|_| ValidationError::MissingAttribute { name: name_of(tag) })?;
    element
        .to_multi_float64()
        .map_err(|e| ValidationError::InvalidAttribute {
            name: name_of(tag),
            reason: e.to_string(),
        })
}

/// Items of a sequence attribute, or `None` when the attribute is absent.
pub(crate) fn items(object: &InMemDicomObject, tag: Tag) -> Option<&[InMemDicomObject]> {
    object.element(tag).ok()?.items()
}

pub(crate) fn required_items(
    object: &InMemDicomObject,
    tag: Tag,
) -> Result<&[InMemDicomObject], ValidationError> {
    items(object, tag).ok_or(ValidationError::MissingAttribute { name: name_of(tag) })
}

/// First item of a sequence attribute.
pub(crate) fn first_item(object: &InMemDicomObject, tag: Tag) -> Option<&InMemDicomObject> {
    items(object, tag)?.first()
}
