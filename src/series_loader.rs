use crate::attributes::{floats, read_buffer, string, uint};
use crate::enums::SortBy;
use crate::geometry::{SeriesGeometry, SeriesMetadata, SliceGeometry, dot};
use crate::tags;
use dicom::object::{FileDicomObject, InMemDicomObject, OpenFileOptions};
use rayon::prelude::*;
use std::{fs, path::Path};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SeriesLoaderError {
    #[error("No valid DICOM images found")]
    NoValidImages,

    #[error("Inconsistent image dimensions")]
    InconsistentDimensions,

    #[error("Images belong to more than one series: {0} and {1}")]
    MultipleSeries(String, String),

    #[error("Missing spacing information")]
    MissingSpacing,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM error: {0}")]
    Dicom(#[from] dicom::object::ReadError),
}

/// Geometry and identity of one image, as needed to place contours.
struct ImageInfo {
    series_instance_uid: String,
    sop_instance_uid: String,
    rows: usize,
    columns: usize,
    image_position: [f64; 3],
    image_orientation: [f64; 6],
    instance_number: Option<u32>,
}

pub struct SeriesLoader;

impl SeriesLoader {
    /// Build series metadata from already parsed image data sets
    ///
    /// # Arguments
    ///
    /// * `dicom_objects` - Images of one series, in any order
    /// * `sort_by` - Method to sort the slices
    ///
    /// # Errors
    ///
    /// Returns error if no image carries plane geometry, if the images
    /// disagree on the grid size or if they span several series
    pub fn load_from_dicom_objects(
        dicom_objects: &[FileDicomObject<InMemDicomObject>],
        sort_by: SortBy,
    ) -> Result<SeriesMetadata, SeriesLoaderError> {
        let mut images: Vec<_> = dicom_objects
            .iter()
            .filter_map(|dicom_object| {
                let image = Self::extract_image_info(dicom_object);
                if image.is_none() {
                    warn!("skipping image without plane geometry");
                }
                image
            })
            .collect();

        let Some(first) = images.first() else {
            return Err(SeriesLoaderError::NoValidImages);
        };
        if let Some(other) = images
            .iter()
            .find(|image| image.series_instance_uid != first.series_instance_uid)
        {
            return Err(SeriesLoaderError::MultipleSeries(
                first.series_instance_uid.clone(),
                other.series_instance_uid.clone(),
            ));
        }
        if images
            .iter()
            .any(|image| (image.rows, image.columns) != (first.rows, first.columns))
        {
            return Err(SeriesLoaderError::InconsistentDimensions);
        }

        let (rows, columns, image_orientation) = (first.rows, first.columns, first.image_orientation);
        let series_instance_uid = first.series_instance_uid.clone();
        Self::sort_images(&mut images, sort_by);

        // Shared attributes are taken from the first image that has them.
        let reference = dicom_objects
            .iter()
            .find(|object| string(object, tags::SERIES_INSTANCE_UID).as_deref() == Some(series_instance_uid.as_str()))
            .ok_or(SeriesLoaderError::NoValidImages)?;
        let pixel_spacing = Self::get_spacing(dicom_objects).ok_or(SeriesLoaderError::MissingSpacing)?;
        let shared = |tag| dicom_objects.iter().find_map(|object| string(object, tag));

        let geometry = SeriesGeometry {
            rows,
            columns,
            pixel_spacing,
            image_orientation,
            slice_thickness: dicom_objects
                .iter()
                .find_map(|object| floats(object, tags::SLICE_THICKNESS)?.first().copied()),
            slices: images
                .into_iter()
                .map(|image| SliceGeometry {
                    sop_instance_uid: image.sop_instance_uid,
                    image_position: image.image_position,
                })
                .collect(),
        };
        debug!(
            series_instance_uid = %series_instance_uid,
            slices = geometry.slices.len(),
            rows,
            columns,
            "loaded series geometry"
        );

        Ok(SeriesMetadata {
            series_instance_uid,
            study_instance_uid: string(reference, tags::STUDY_INSTANCE_UID).unwrap_or_default(),
            frame_of_reference_uid: shared(tags::FRAME_OF_REFERENCE_UID),
            sop_class_uid: string(reference, tags::SOP_CLASS_UID).unwrap_or_default(),
            patient_name: shared(tags::PATIENT_NAME),
            patient_id: shared(tags::PATIENT_ID),
            study_date: shared(tags::STUDY_DATE),
            geometry,
        })
    }

    /// Build series metadata from complete DICOM files held in memory
    pub fn load_from_buffers(
        buffers: &[impl AsRef<[u8]> + Sync],
        sort_by: SortBy,
    ) -> Result<SeriesMetadata, SeriesLoaderError> {
        let objects: Result<Vec<_>, _> = buffers
            .par_iter()
            .map(|buffer| read_buffer(buffer.as_ref()))
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Build series metadata from file paths; pixel data is not read
    pub fn load_from_file_paths(
        paths: &[impl AsRef<Path> + Sync],
        sort_by: SortBy,
    ) -> Result<SeriesMetadata, SeriesLoaderError> {
        let objects: Result<Vec<_>, _> = paths
            .par_iter()
            .map(|path| {
                OpenFileOptions::new()
                    .read_until(tags::PIXEL_DATA)
                    .open_file(path.as_ref())
            })
            .collect();

        Self::load_from_dicom_objects(&objects?, sort_by)
    }

    /// Build series metadata from a directory containing .dcm files
    pub fn load_from_directory(
        path: impl AsRef<Path>,
        sort_by: SortBy,
    ) -> Result<SeriesMetadata, SeriesLoaderError> {
        let paths: Vec<_> = fs::read_dir(path.as_ref())?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension()
                    .and_then(|s| s.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("dcm"))
            })
            .collect();

        if paths.is_empty() {
            return Err(SeriesLoaderError::NoValidImages);
        }

        Self::load_from_file_paths(&paths, sort_by)
    }

    fn extract_image_info(dicom_object: &FileDicomObject<InMemDicomObject>) -> Option<ImageInfo> {
        let image_position = <[f64; 3]>::try_from(floats(dicom_object, tags::IMAGE_POSITION_PATIENT)?).ok()?;
        let image_orientation =
            <[f64; 6]>::try_from(floats(dicom_object, tags::IMAGE_ORIENTATION_PATIENT)?).ok()?;
        Some(ImageInfo {
            series_instance_uid: string(dicom_object, tags::SERIES_INSTANCE_UID)?,
            sop_instance_uid: string(dicom_object, tags::SOP_INSTANCE_UID)?,
            rows: uint(dicom_object, tags::ROWS)? as usize,
            columns: uint(dicom_object, tags::COLUMNS)? as usize,
            image_position,
            image_orientation,
            instance_number: uint(dicom_object, tags::INSTANCE_NUMBER),
        })
    }

    fn sort_images(images: &mut [ImageInfo], sort_by: SortBy) {
        match sort_by {
            SortBy::ImagePositionPatient => {
                let [rx, ry, rz, cx, cy, cz] = images[0].image_orientation;
                let normal = [ry * cz - rz * cy, rz * cx - rx * cz, rx * cy - ry * cx];
                images.sort_by(|a, b| {
                    dot(&a.image_position, &normal).total_cmp(&dot(&b.image_position, &normal))
                });
            }
            SortBy::InstanceNumber => images.sort_by_key(|image| image.instance_number),
            SortBy::None => {}
        }
    }

    fn get_spacing(dicom_objects: &[FileDicomObject<InMemDicomObject>]) -> Option<[f64; 2]> {
        dicom_objects.iter().find_map(|dicom_object| {
            let pixel_spacing = floats(dicom_object, tags::PIXEL_SPACING)?;
            <[f64; 2]>::try_from(pixel_spacing)
                .ok()
                .filter(|spacing| spacing.iter().all(|&value| value > 0.0 && value.is_finite()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom::core::{DataElement, PrimitiveValue, VR};
    use dicom::object::FileMetaTableBuilder;
    use dicom_dictionary_std::uids;

    fn image(sop: &str, series: &str, z: f64, instance: u32) -> FileDicomObject<InMemDicomObject> {
        image_with_spacing(sop, series, z, instance, ["0.5", "0.5"])
    }

    fn image_with_spacing(
        sop: &str,
        series: &str,
        z: f64,
        instance: u32,
        spacing: [&str; 2],
    ) -> FileDicomObject<InMemDicomObject> {
        let text = |tag, vr, value: String| DataElement::new(tag, vr, PrimitiveValue::from(value));
        let object = InMemDicomObject::from_element_iter([
            text(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE.to_string()),
            text(tags::SOP_INSTANCE_UID, VR::UI, sop.to_string()),
            text(tags::STUDY_INSTANCE_UID, VR::UI, "1.2.3".to_string()),
            text(tags::SERIES_INSTANCE_UID, VR::UI, series.to_string()),
            text(tags::INSTANCE_NUMBER, VR::IS, instance.to_string()),
            DataElement::new(
                tags::IMAGE_POSITION_PATIENT,
                VR::DS,
                PrimitiveValue::Strs(["0".to_string(), "0".to_string(), z.to_string()].into_iter().collect()),
            ),
            DataElement::new(
                tags::IMAGE_ORIENTATION_PATIENT,
                VR::DS,
                PrimitiveValue::Strs(["1", "0", "0", "0", "1", "0"].map(String::from).into_iter().collect()),
            ),
            DataElement::new(
                tags::PIXEL_SPACING,
                VR::DS,
                PrimitiveValue::Strs(spacing.map(String::from).into_iter().collect()),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)),
        ]);
        object.with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop),
        )
        .expect("valid meta")
    }

    fn order(metadata: &SeriesMetadata) -> Vec<&str> {
        metadata
            .geometry
            .slices
            .iter()
            .map(|slice| slice.sop_instance_uid.as_str())
            .collect()
    }

    #[test]
    fn sorts_slices_along_the_plane_normal() {
        let objects = [image("c", "s", 5.0, 1), image("a", "s", -5.0, 3), image("b", "s", 0.0, 2)];
        let metadata = SeriesLoader::load_from_dicom_objects(&objects, SortBy::ImagePositionPatient)
            .expect("valid series");
        assert_eq!(order(&metadata), vec!["a", "b", "c"]);
        assert_eq!(metadata.geometry.dim(), (4, 4));
        assert_eq!(metadata.geometry.pixel_spacing, [0.5, 0.5]);
        assert_eq!(metadata.study_instance_uid, "1.2.3");
    }

    #[test]
    fn sorts_slices_by_instance_number() {
        let objects = [image("c", "s", 5.0, 1), image("a", "s", -5.0, 3), image("b", "s", 0.0, 2)];
        let metadata =
            SeriesLoader::load_from_dicom_objects(&objects, SortBy::InstanceNumber).expect("valid series");
        assert_eq!(order(&metadata), vec!["c", "b", "a"]);
    }

    #[test]
    fn rejects_mixed_series() {
        let objects = [image("a", "s1", 0.0, 1), image("b", "s2", 1.0, 2)];
        let err = SeriesLoader::load_from_dicom_objects(&objects, SortBy::None).unwrap_err();
        assert!(matches!(err, SeriesLoaderError::MultipleSeries(..)));
    }

    #[test]
    fn rejects_non_positive_spacing() {
        let objects = [
            image_with_spacing("a", "s", 0.0, 1, ["0", "0.5"]),
            image_with_spacing("b", "s", 1.0, 2, ["0.5", "-1"]),
        ];
        let err = SeriesLoader::load_from_dicom_objects(&objects, SortBy::None).unwrap_err();
        assert!(matches!(err, SeriesLoaderError::MissingSpacing));
    }

    #[test]
    fn empty_directory_has_no_images() {
        let dir = tempfile::tempdir().expect("temp dir");
        let err = SeriesLoader::load_from_directory(dir.path(), SortBy::None).unwrap_err();
        assert!(matches!(err, SeriesLoaderError::NoValidImages));
    }

    #[test]
    fn loads_series_from_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        for (i, z) in [2.0, 1.0].into_iter().enumerate() {
            let sop = format!("1.2.{i}");
            image(&sop, "s", z, i as u32 + 1)
                .write_to_file(dir.path().join(format!("{i}.dcm")))
                .expect("written");
        }
        let metadata =
            SeriesLoader::load_from_directory(dir.path(), SortBy::ImagePositionPatient).expect("valid series");
        assert_eq!(order(&metadata), vec!["1.2.1", "1.2.0"]);
    }
}
