use crate::extraction::DicomMetadata;
use crate::types::{AcquisitionDate, Confidence, ModalityBucket};

/// Outcome of classifying one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Assigned modality bucket
    pub bucket: ModalityBucket,

    /// Which rule decided the bucket
    pub confidence: Confidence,

    /// Treatment date, or the unknown sentinel
    pub date: AcquisitionDate,

    /// Filename said CT and metadata said CBCT (or the reverse)
    ///
    /// The only pair the cross-validator can arbitrate statistically, so it
    /// is flagged even though the metadata ruling already stands.
    pub ct_cbct_conflict: bool,
}

/// Classifies a file from its name and extracted metadata
///
/// Rules in priority order; the first match wins, later rules break ties
/// or fill gaps:
///
/// 1. Filename prefix table (`CT.` / `RI.` / `RS.` / `RT.` / `RP.` / `RD.`),
///    provisional, confidence [`Confidence::Filename`].
/// 2. Metadata modality tag. Fills the gap when no prefix matched; on
///    disagreement metadata wins (filenames are operator-controlled and
///    less reliable than acquisition metadata).
/// 3. Neither rule fires: [`ModalityBucket::Unclassified`], never a guess.
///
/// The date comes from the extractor's best raw date; absent or unparsable
/// values become [`AcquisitionDate::Unknown`].
pub fn classify(file_name: &str, meta: &DicomMetadata) -> Classification {
    let from_name = ModalityBucket::from_filename_prefix(file_name);
    let from_meta = meta
        .modality
        .as_deref()
        .and_then(ModalityBucket::from_modality);

    let (bucket, confidence) = match (from_name, from_meta) {
        (Some(n), Some(m)) if n == m => (n, Confidence::Filename),
        (Some(_), Some(m)) => (m, Confidence::Metadata),
        (Some(n), None) => (n, Confidence::Filename),
        (None, Some(m)) => (m, Confidence::Metadata),
        (None, None) => (ModalityBucket::Unclassified, Confidence::None),
    };

    let ct_cbct_conflict = matches!(
        (from_name, from_meta),
        (
            Some(ModalityBucket::CtPlanning),
            Some(ModalityBucket::CbctVerification)
        ) | (
            Some(ModalityBucket::CbctVerification),
            Some(ModalityBucket::CtPlanning)
        )
    );

    Classification {
        bucket,
        confidence,
        date: AcquisitionDate::from_dicom(meta.best_raw_date()),
        ct_cbct_conflict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn make_meta(modality: Option<&str>, study_date: Option<&str>) -> DicomMetadata {
        DicomMetadata {
            patient_id: "25001565".to_string(),
            modality: modality.map(|s| s.to_string()),
            sop_instance_uid: None,
            acquisition_date: None,
            content_date: None,
            series_date: None,
            study_date: study_date.map(|s| s.to_string()),
            rows: Some(512),
            columns: Some(512),
            size_bytes: 524288,
        }
    }

    #[test]
    fn test_filename_and_metadata_agree() {
        let c = classify("CT.25001565.Image1.dcm", &make_meta(Some("CT"), Some("20230115")));
        assert_eq!(c.bucket, ModalityBucket::CtPlanning);
        assert_eq!(c.confidence, Confidence::Filename);
        assert_eq!(c.date.to_string(), "2023-01-15");
        assert!(!c.ct_cbct_conflict);
    }

    #[test]
    fn test_metadata_wins_on_disagreement() {
        // RI. prefix but modality CT: metadata rules, conflict flagged
        let c = classify("RI.25001565.MV_1.dcm", &make_meta(Some("CT"), None));
        assert_eq!(c.bucket, ModalityBucket::CtPlanning);
        assert_eq!(c.confidence, Confidence::Metadata);
        assert!(c.ct_cbct_conflict);

        let c = classify("CT.25001565.Image1.dcm", &make_meta(Some("RTIMAGE"), None));
        assert_eq!(c.bucket, ModalityBucket::CbctVerification);
        assert_eq!(c.confidence, Confidence::Metadata);
        assert!(c.ct_cbct_conflict);
    }

    #[test]
    fn test_non_imaging_disagreement_is_not_a_conflict() {
        // RS. prefix, RTDOSE modality: metadata wins but this is not the
        // CT-vs-CBCT pair the cross-validator arbitrates
        let c = classify("RS.25001565.Plan.dcm", &make_meta(Some("RTDOSE"), None));
        assert_eq!(c.bucket, ModalityBucket::Dose);
        assert_eq!(c.confidence, Confidence::Metadata);
        assert!(!c.ct_cbct_conflict);
    }

    #[rstest]
    #[case("RS.25001565.Sets.dcm", ModalityBucket::StructureSet)]
    #[case("RT.25001565.Rec.dcm", ModalityBucket::Plan)]
    #[case("RP.25001565.Plan.dcm", ModalityBucket::Plan)]
    #[case("RD.25001565.Dose.dcm", ModalityBucket::Dose)]
    fn test_filename_only_classification(#[case] name: &str, #[case] expected: ModalityBucket) {
        let c = classify(name, &make_meta(None, None));
        assert_eq!(c.bucket, expected);
        assert_eq!(c.confidence, Confidence::Filename);
    }

    #[test]
    fn test_metadata_fills_gap_when_no_prefix() {
        let c = classify("image042.dcm", &make_meta(Some("RTIMAGE"), None));
        assert_eq!(c.bucket, ModalityBucket::CbctVerification);
        assert_eq!(c.confidence, Confidence::Metadata);
    }

    #[test]
    fn test_unresolved_is_unclassified() {
        let c = classify("image042.dcm", &make_meta(None, None));
        assert_eq!(c.bucket, ModalityBucket::Unclassified);
        assert_eq!(c.confidence, Confidence::None);

        // Unknown modality string is not a guess either
        let c = classify("image042.dcm", &make_meta(Some("SR"), None));
        assert_eq!(c.bucket, ModalityBucket::Unclassified);
    }

    #[test]
    fn test_missing_date_is_unknown() {
        let c = classify("CT.25001565.Image1.dcm", &make_meta(Some("CT"), None));
        assert!(c.date.is_unknown());

        let c = classify("CT.25001565.Image1.dcm", &make_meta(Some("CT"), Some("garbage")));
        assert!(c.date.is_unknown());
    }
}
