use crate::error::ExtractError;
use crate::extraction::tags::{
    get_string_value, get_u16_value, ACQUISITION_DATE, COLUMNS, CONTENT_DATE, MODALITY, PATIENT_ID,
    ROWS, SERIES_DATE, SOP_INSTANCE_UID, STUDY_DATE,
};
use dicom_object::{open_file, InMemDicomObject};
use regex::Regex;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Metadata record produced by the extractor boundary
///
/// Header-level attributes only; pixel data is never decoded. Date fields
/// carry the raw DICOM `YYYYMMDD` strings so the classifier owns parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DicomMetadata {
    /// Patient identifier, from the PatientID tag or the filename convention
    pub patient_id: String,

    /// Modality tag value (CT, RTIMAGE, RTSTRUCT, ...)
    pub modality: Option<String>,

    /// SOP Instance UID, the primary duplicate-identity key
    pub sop_instance_uid: Option<String>,

    /// Raw AcquisitionDate tag value
    pub acquisition_date: Option<String>,

    /// Raw ContentDate tag value
    pub content_date: Option<String>,

    /// Raw SeriesDate tag value
    pub series_date: Option<String>,

    /// Raw StudyDate tag value
    pub study_date: Option<String>,

    /// Number of rows in the pixel grid
    pub rows: Option<u16>,

    /// Number of columns in the pixel grid
    pub columns: Option<u16>,

    /// File size on disk in bytes
    pub size_bytes: u64,
}

impl DicomMetadata {
    /// Returns the best available raw date string
    ///
    /// Priority: AcquisitionDate, ContentDate, SeriesDate, StudyDate.
    pub fn best_raw_date(&self) -> Option<&str> {
        self.acquisition_date
            .as_deref()
            .or(self.content_date.as_deref())
            .or(self.series_date.as_deref())
            .or(self.study_date.as_deref())
    }
}

/// Boundary to the external DICOM metadata reader
///
/// `organize`, `detect_duplicates` and `analyze_tree` only speak to files
/// through this trait, so tests can substitute a canned source.
pub trait MetadataSource: Sync {
    /// Reads the metadata record for one file, or a typed failure
    fn read_metadata(&self, path: &Path) -> Result<DicomMetadata, ExtractError>;
}

/// Metadata extractor backed by `dicom-object`
///
/// # Example
///
/// ```no_run
/// use rtsort_core::{DicomExtractor, MetadataSource};
/// use std::path::Path;
///
/// let meta = DicomExtractor.read_metadata(Path::new("CT.25001565.Image1.dcm"))?;
/// assert_eq!(meta.patient_id, "25001565");
/// # Ok::<(), rtsort_core::ExtractError>(())
/// ```
pub struct DicomExtractor;

impl MetadataSource for DicomExtractor {
    fn read_metadata(&self, path: &Path) -> Result<DicomMetadata, ExtractError> {
        let obj = open_file(path).map_err(|e| map_open_error(path, e))?;
        let size_bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        extract_from_object(&file_name, &obj, size_bytes)
    }
}

/// Builds the metadata record from an opened DICOM object
///
/// PatientID falls back to the filename convention (`CT.<id>.…`) when the
/// tag is absent; a record without any patient id is a typed failure.
pub fn extract_from_object(
    file_name: &str,
    dcm: &InMemDicomObject,
    size_bytes: u64,
) -> Result<DicomMetadata, ExtractError> {
    let patient_id = get_string_value(dcm, PATIENT_ID)
        .or_else(|| patient_id_from_filename(file_name))
        .ok_or(ExtractError::MissingRequiredTag("PatientID"))?;

    Ok(DicomMetadata {
        patient_id,
        modality: get_string_value(dcm, MODALITY),
        sop_instance_uid: get_string_value(dcm, SOP_INSTANCE_UID),
        acquisition_date: get_string_value(dcm, ACQUISITION_DATE),
        content_date: get_string_value(dcm, CONTENT_DATE),
        series_date: get_string_value(dcm, SERIES_DATE),
        study_date: get_string_value(dcm, STUDY_DATE),
        rows: get_u16_value(dcm, ROWS),
        columns: get_u16_value(dcm, COLUMNS),
        size_bytes,
    })
}

/// Extracts the patient id from the filename convention
///
/// Treatment-planning exports in this corpus are named
/// `CT.25001565.Image 1.0004.dcm`, `RI.25001565.MV_1.dcm` and so on; the
/// second dot-separated component is the patient id.
pub fn patient_id_from_filename(file_name: &str) -> Option<String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z]{2}\.([A-Za-z0-9]+)\.").expect("valid filename pattern")
    });
    re.captures(file_name)
        .map(|caps| caps[1].to_string())
        .filter(|s| !s.is_empty())
}

fn map_open_error(path: &Path, err: dicom_object::ReadError) -> ExtractError {
    // A file we cannot even stat is unreadable; anything else was readable
    // bytes that failed to parse as DICOM.
    if fs::metadata(path).is_err() {
        ExtractError::NotReadable(format!("{}", err))
    } else {
        ExtractError::CorruptPayload(format!("{}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use rstest::rstest;

    fn make_test_object(patient_id: Option<&str>, modality: &str) -> InMemDicomObject {
        let mut obj = InMemDicomObject::new_empty();
        if let Some(pid) = patient_id {
            obj.put(DataElement::new(
                PATIENT_ID,
                VR::LO,
                PrimitiveValue::from(pid),
            ));
        }
        obj.put(DataElement::new(
            MODALITY,
            VR::CS,
            PrimitiveValue::from(modality),
        ));
        obj
    }

    #[test]
    fn test_extract_basic_record() {
        let mut obj = make_test_object(Some("25001565"), "CT");
        obj.put(DataElement::new(
            STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("20230115"),
        ));
        obj.put(DataElement::new(
            ROWS,
            VR::US,
            PrimitiveValue::from(512u16),
        ));
        obj.put(DataElement::new(
            COLUMNS,
            VR::US,
            PrimitiveValue::from(512u16),
        ));

        let meta = extract_from_object("CT.25001565.Image1.dcm", &obj, 1024).unwrap();
        assert_eq!(meta.patient_id, "25001565");
        assert_eq!(meta.modality.as_deref(), Some("CT"));
        assert_eq!(meta.best_raw_date(), Some("20230115"));
        assert_eq!(meta.rows, Some(512));
        assert_eq!(meta.size_bytes, 1024);
    }

    #[test]
    fn test_patient_id_falls_back_to_filename() {
        let obj = make_test_object(None, "RTIMAGE");
        let meta = extract_from_object("RI.25001565.MV_1.dcm", &obj, 0).unwrap();
        assert_eq!(meta.patient_id, "25001565");
    }

    #[test]
    fn test_missing_patient_id_is_typed_failure() {
        let obj = make_test_object(None, "CT");
        let err = extract_from_object("strange-name.dcm", &obj, 0).unwrap_err();
        assert_eq!(err, ExtractError::MissingRequiredTag("PatientID"));
    }

    #[test]
    fn test_date_priority_order() {
        let mut obj = make_test_object(Some("1"), "CT");
        obj.put(DataElement::new(
            STUDY_DATE,
            VR::DA,
            PrimitiveValue::from("20230101"),
        ));
        obj.put(DataElement::new(
            ACQUISITION_DATE,
            VR::DA,
            PrimitiveValue::from("20230103"),
        ));

        let meta = extract_from_object("CT.1.Image1.dcm", &obj, 0).unwrap();
        // AcquisitionDate wins over StudyDate
        assert_eq!(meta.best_raw_date(), Some("20230103"));
    }

    #[rstest]
    #[case("CT.25001565.Image 1.0004.dcm", Some("25001565"))]
    #[case("RI.25001565.MV_1.dcm", Some("25001565"))]
    #[case("RS.25001565.Plan1.dcm", Some("25001565"))]
    #[case("RS.dcm", None)] // no id component
    #[case("notdicom.txt", None)]
    #[case("CT..Image1.dcm", None)]
    fn test_patient_id_from_filename(#[case] name: &str, #[case] expected: Option<&str>) {
        assert_eq!(
            patient_id_from_filename(name),
            expected.map(|s| s.to_string())
        );
    }

    #[test]
    fn test_extractor_reports_unreadable_file() {
        let err = DicomExtractor
            .read_metadata(Path::new("/nonexistent/CT.1.Image1.dcm"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::NotReadable(_)));
    }

    #[test]
    fn test_extractor_reports_corrupt_payload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("CT.1.Image1.dcm");
        std::fs::write(&path, b"this is not a DICOM file").unwrap();

        let err = DicomExtractor.read_metadata(&path).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptPayload(_)));
    }
}
