mod common;

use common::{Contour, Roi, RtStructBuilder, SERIES_UID, SLICES, STRUCT_SOP_UID};
use dicom_dictionary_std::uids;
use dicom_rtstruct_seg::rtstruct::DecodeOutcome;
use dicom_rtstruct_seg::{
    DecodeError, Diagnostic, RtStructDecoder, StructureSet, ValidationError, VolumeRegistry, tags,
};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn decode(registry: &VolumeRegistry, buffer: &[u8]) -> Result<DecodeOutcome, DecodeError> {
    RtStructDecoder::new(registry).decode(buffer, SERIES_UID, "Contours", "RTSTRUCT")
}

#[test]
fn rejects_other_sop_classes_without_registering() {
    let buffer = RtStructBuilder::new()
        .sop_class_uid(uids::CT_IMAGE_STORAGE)
        .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0)]))
        .build();
    let registry = VolumeRegistry::new();

    let err = decode(&registry, &buffer).unwrap_err();

    assert!(matches!(
        err,
        DecodeError::Validation(ValidationError::NotRtStruct { found }) if found == uids::CT_IMAGE_STORAGE
    ));
    assert!(registry.is_empty());
}

#[test]
fn rejects_garbage() {
    let registry = VolumeRegistry::new();
    let err = decode(&registry, b"definitely not a DICOM file").unwrap_err();
    assert!(matches!(err, DecodeError::Parse(_)));
    assert!(registry.is_empty());
}

#[test]
fn keeps_contour_points_in_order() {
    let points = [(3.0, 4.0), (12.5, 4.0), (12.5, 9.25), (7.0, 11.0), (3.0, 9.0)];
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(1, vec![Contour::closed(1, &points)]))
        .build();
    let registry = VolumeRegistry::new();

    let outcome = decode(&registry, &buffer).expect("valid structure set");

    assert!(outcome.diagnostics.is_empty());
    assert_eq!(outcome.polygons.len(), 1);
    let polygon = &outcome.polygons[0];
    assert_eq!(
        polygon.points.iter().map(|p| [p.x, p.y, p.z]).collect::<Vec<_>>(),
        points.iter().map(|&(x, y)| [x, y, 5.0]).collect::<Vec<_>>()
    );
    assert_eq!(polygon.referenced_sop_instance_uid, SLICES[1]);
    assert_eq!(polygon.series_instance_uid, SERIES_UID);
    assert_eq!(polygon.structure_set_label, "RTSTRUCT");
    assert_eq!(polygon.uid, format!("{STRUCT_SOP_UID}.1.1"));
    assert_eq!(polygon.roi_contour_uid, format!("{STRUCT_SOP_UID}.RTSTRUCT.1"));
}

#[test]
fn registers_named_roi_contours() {
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(1, vec![Contour::square(0, 1.0, 4.0)]).with_color([255, 0, 0]))
        .roi(Roi::new(2, vec![Contour::square(2, 1.0, 4.0)]))
        .build();
    let registry = VolumeRegistry::new();

    decode(&registry, &buffer).expect("valid structure set");

    let structure_set = registry
        .structure_set(SERIES_UID, "RTSTRUCT")
        .expect("structure set registered");
    let structure_set = structure_set.read().expect("not poisoned");
    assert_eq!(structure_set.name, "Contours");
    assert!(structure_set.is_locked);
    assert!(structure_set.visible);

    let names: Vec<_> = structure_set
        .roi_contours()
        .iter()
        .map(|roi| {
            let roi = roi.read().expect("not poisoned");
            (roi.name.clone(), roi.color)
        })
        .collect();
    assert_eq!(
        names,
        vec![
            ("Liver Lesion 1".to_string(), Some([255, 0, 0])),
            ("Liver Lesion 2".to_string(), None),
        ]
    );
}

#[test]
fn unnamed_structure_sets_name_rois_after_their_label() {
    let buffer = RtStructBuilder::new()
        .without_name()
        .roi(Roi::new(3, vec![Contour::square(0, 1.0, 4.0)]))
        .build();
    let registry = VolumeRegistry::new();

    decode(&registry, &buffer).expect("valid structure set");

    let roi = registry
        .find_roi_contour(SERIES_UID, &format!("{STRUCT_SOP_UID}.RTSTRUCT.3"))
        .expect("registered");
    assert_eq!(roi.read().expect("not poisoned").name, "RTSTRUCT Lesion 3");
}

#[test]
fn missing_mandatory_sequences_are_named() {
    for (tag, name) in [
        (tags::ROI_CONTOUR_SEQUENCE, "ROIContourSequence"),
        (
            tags::REFERENCED_FRAME_OF_REFERENCE_SEQUENCE,
            "ReferencedFrameOfReferenceSequence",
        ),
    ] {
        let buffer = RtStructBuilder::new()
            .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0)]))
            .without(tag)
            .build();
        let registry = VolumeRegistry::new();

        let err = decode(&registry, &buffer).unwrap_err();

        assert!(
            matches!(
                &err,
                DecodeError::Validation(ValidationError::MissingAttribute { name: missing }) if *missing == name
            ),
            "unexpected error {err:?}"
        );
        assert!(registry.is_empty());
    }
}

#[test]
fn contour_data_must_hold_three_values_per_point() {
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0).declaring_points(5)]))
        .build();
    let registry = VolumeRegistry::new();

    let err = decode(&registry, &buffer).unwrap_err();

    assert!(matches!(
        err,
        DecodeError::Validation(ValidationError::InvalidAttribute { name: "ContourData", .. })
    ));
    assert!(registry.is_empty());
}

#[test]
fn failed_reimport_keeps_the_registered_structure_set() {
    let registry = VolumeRegistry::new();
    let good = RtStructBuilder::new()
        .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0)]))
        .build();
    decode(&registry, &good).expect("valid structure set");
    let before = registry
        .structure_set(SERIES_UID, "RTSTRUCT")
        .expect("registered");

    let bad = RtStructBuilder::new()
        .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0)]))
        .roi(Roi::new(2, vec![Contour::square(1, 10.0, 20.0).declaring_points(2)]))
        .build();
    decode(&registry, &bad).unwrap_err();

    let after = registry
        .structure_set(SERIES_UID, "RTSTRUCT")
        .expect("still registered");
    assert!(Arc::ptr_eq(&before, &after));
    let after = after.read().expect("not poisoned");
    assert_eq!(after.roi_contours().len(), 1);
    assert_eq!(after.roi_contours()[0].read().expect("not poisoned").polygons.len(), 1);
}

#[test]
fn skips_unsupported_geometry() {
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(
            1,
            vec![Contour::square(0, 10.0, 20.0).with_type("OPEN_NONPLANAR")],
        ))
        .build();
    let registry = VolumeRegistry::new();

    let outcome = decode(&registry, &buffer).expect("valid structure set");

    assert!(outcome.polygons.is_empty());
    assert_eq!(
        outcome.diagnostics,
        vec![Diagnostic::UnsupportedGeometry {
            contour: format!("{STRUCT_SOP_UID}.1.1"),
            geometric_type: "OPEN_NONPLANAR".to_string(),
        }]
    );
}

#[test]
fn skips_contours_outside_the_series() {
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(
            1,
            vec![
                Contour::square(0, 10.0, 20.0).referencing("9.9.9"),
                Contour::square(1, 10.0, 20.0),
            ],
        ))
        .build();
    let registry = VolumeRegistry::new();

    let outcome = decode(&registry, &buffer).expect("valid structure set");

    assert_eq!(outcome.polygons.len(), 1);
    assert_eq!(outcome.polygons[0].referenced_sop_instance_uid, SLICES[1]);
    assert_eq!(
        outcome.diagnostics,
        vec![Diagnostic::ReferenceMismatch {
            contour: format!("{STRUCT_SOP_UID}.1.1"),
            sop_instance_uid: "9.9.9".to_string(),
        }]
    );
}

#[test]
fn other_series_yield_nothing() {
    let buffer = RtStructBuilder::new()
        .referenced_series("1.2.3.4.5")
        .roi(Roi::new(1, vec![Contour::square(0, 10.0, 20.0)]))
        .build();
    let registry = VolumeRegistry::new();

    let outcome = decode(&registry, &buffer).expect("valid structure set");

    assert!(outcome.polygons.is_empty());
    assert!(registry.is_empty());
}

#[test]
fn repeated_decode_does_not_duplicate() {
    let buffer = RtStructBuilder::new()
        .roi(Roi::new(
            1,
            vec![Contour::square(0, 10.0, 20.0), Contour::square(1, 10.0, 20.0)],
        ))
        .build();
    let registry = VolumeRegistry::new();

    decode(&registry, &buffer).expect("first decode");
    let first = registry
        .structure_set(SERIES_UID, "RTSTRUCT")
        .expect("registered");
    decode(&registry, &buffer).expect("second decode");
    let second = registry
        .structure_set(SERIES_UID, "RTSTRUCT")
        .expect("registered");

    assert_eq!(registry.structure_sets_for_series(SERIES_UID).len(), 1);
    let first = first.read().expect("not poisoned");
    let second = second.read().expect("not poisoned");
    assert_eq!(first.roi_contours().len(), second.roi_contours().len());
    let counts = |set: &StructureSet| -> Vec<usize> {
        set.roi_contours()
            .iter()
            .map(|roi| roi.read().expect("not poisoned").polygons.len())
            .collect()
    };
    assert_eq!(counts(&first), counts(&second));
    assert_eq!(counts(&second), vec![2]);
}

#[test]
fn lookups_return_the_same_entity() {
    let registry = VolumeRegistry::new();
    let a = registry.get_or_create_roi_contour(SERIES_UID, "RTSTRUCT", "Lesion", "1.2.3");
    let b = registry.get_or_create_roi_contour(SERIES_UID, "RTSTRUCT", "Lesion", "1.2.3");
    assert!(Arc::ptr_eq(&a, &b));
}
