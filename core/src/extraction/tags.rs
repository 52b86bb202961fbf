use dicom_core::Tag;
use dicom_object::InMemDicomObject;

// Core Identification Tags
pub const MODALITY: Tag = Tag(0x0008, 0x0060);
pub const SOP_INSTANCE_UID: Tag = Tag(0x0008, 0x0018);

// Date Tags (in the order the organizer prefers them)
pub const ACQUISITION_DATE: Tag = Tag(0x0008, 0x0022);
pub const CONTENT_DATE: Tag = Tag(0x0008, 0x0023);
pub const SERIES_DATE: Tag = Tag(0x0008, 0x0021);
pub const STUDY_DATE: Tag = Tag(0x0008, 0x0020);

// Image Geometry Tags
pub const ROWS: Tag = Tag(0x0028, 0x0010);
pub const COLUMNS: Tag = Tag(0x0028, 0x0011);

// Patient Tags
pub const PATIENT_ID: Tag = Tag(0x0010, 0x0020);

/// Helper to get string value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to string
pub fn get_string_value(dcm: &InMemDicomObject, tag: Tag) -> Option<String> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Helper to get u16 value from DICOM tag
///
/// Returns `None` if the tag is not present or cannot be converted to u16
pub fn get_u16_value(dcm: &InMemDicomObject, tag: Tag) -> Option<u16> {
    dcm.element(tag)
        .ok()
        .and_then(|elem| elem.to_int::<u16>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};

    #[test]
    fn test_tag_values() {
        assert_eq!(MODALITY, Tag(0x0008, 0x0060));
        assert_eq!(SOP_INSTANCE_UID, Tag(0x0008, 0x0018));
        assert_eq!(STUDY_DATE, Tag(0x0008, 0x0020));
        assert_eq!(ROWS, Tag(0x0028, 0x0010));
        assert_eq!(PATIENT_ID, Tag(0x0010, 0x0020));
    }

    #[test]
    fn test_get_string_value_trims_and_filters_empty() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(
            MODALITY,
            VR::CS,
            PrimitiveValue::from("CT "),
        ));
        obj.put(DataElement::new(
            PATIENT_ID,
            VR::LO,
            PrimitiveValue::from("  "),
        ));

        assert_eq!(get_string_value(&obj, MODALITY), Some("CT".to_string()));
        assert_eq!(get_string_value(&obj, PATIENT_ID), None);
        assert_eq!(get_string_value(&obj, STUDY_DATE), None);
    }

    #[test]
    fn test_get_u16_value() {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(ROWS, VR::US, PrimitiveValue::from(512u16)));

        assert_eq!(get_u16_value(&obj, ROWS), Some(512));
        assert_eq!(get_u16_value(&obj, COLUMNS), None);
    }
}
