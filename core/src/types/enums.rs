use std::fmt;

/// Modality bucket a file is organized under
///
/// Buckets map one-to-one onto the top-level directories of a patient tree.
/// Only planning CT and verification CBCT get dated sub-structure; RT
/// structure/plan/dose objects are not dated sessions in this model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(rename_all = "snake_case"))]
pub enum ModalityBucket {
    /// Planning CT: the reference volumetric scan, acquired once
    CtPlanning,
    /// Cone-beam CT verification imaging, one per treatment session
    CbctVerification,
    /// RT structure set
    StructureSet,
    /// RT plan or treatment record
    Plan,
    /// RT dose
    Dose,
    /// Imaging of some other modality (MR, US, ...)
    OtherImage,
    /// Neither filename nor metadata rule fired
    Unclassified,
}

impl ModalityBucket {
    /// Directory name for this bucket under a patient tree
    pub fn bucket_dir(&self) -> &'static str {
        match self {
            ModalityBucket::CtPlanning => "CT",
            ModalityBucket::CbctVerification => "CBCT",
            ModalityBucket::StructureSet => "RS",
            ModalityBucket::Plan => "RT",
            ModalityBucket::Dose => "RD",
            ModalityBucket::OtherImage => "other",
            ModalityBucket::Unclassified => "unclassified",
        }
    }

    /// Parses a bucket back from its directory name
    pub fn from_bucket_dir(dir: &str) -> Option<Self> {
        match dir {
            "CT" => Some(ModalityBucket::CtPlanning),
            "CBCT" => Some(ModalityBucket::CbctVerification),
            "RS" => Some(ModalityBucket::StructureSet),
            "RT" => Some(ModalityBucket::Plan),
            "RD" => Some(ModalityBucket::Dose),
            "other" => Some(ModalityBucket::OtherImage),
            "unclassified" => Some(ModalityBucket::Unclassified),
            _ => None,
        }
    }

    /// Provisional bucket from the filename prefix convention
    ///
    /// `CT.` / `RI.` / `RS.` / `RT.` / `RP.` / `RD.` per the export naming
    /// used by the treatment planning system.
    pub fn from_filename_prefix(file_name: &str) -> Option<Self> {
        if file_name.starts_with("CT.") {
            Some(ModalityBucket::CtPlanning)
        } else if file_name.starts_with("RI.") {
            Some(ModalityBucket::CbctVerification)
        } else if file_name.starts_with("RS.") {
            Some(ModalityBucket::StructureSet)
        } else if file_name.starts_with("RT.") || file_name.starts_with("RP.") {
            Some(ModalityBucket::Plan)
        } else if file_name.starts_with("RD.") {
            Some(ModalityBucket::Dose)
        } else {
            None
        }
    }

    /// Bucket from the DICOM modality tag
    ///
    /// Cone-beam verification imaging is stored as RTIMAGE in this corpus;
    /// vendor spellings of CBCT are accepted as well. Imaging modalities
    /// outside the RT family map to [`ModalityBucket::OtherImage`].
    pub fn from_modality(modality: &str) -> Option<Self> {
        let m = modality.trim().to_uppercase();
        match m.as_str() {
            "CT" => Some(ModalityBucket::CtPlanning),
            "RTIMAGE" | "RI" => Some(ModalityBucket::CbctVerification),
            "RTSTRUCT" => Some(ModalityBucket::StructureSet),
            "RTPLAN" | "RTRECORD" => Some(ModalityBucket::Plan),
            "RTDOSE" => Some(ModalityBucket::Dose),
            "MR" | "US" | "PT" | "NM" | "CR" | "DX" | "XA" | "MG" => {
                Some(ModalityBucket::OtherImage)
            }
            _ => {
                if m.contains("CBCT") || m.contains("CONE") {
                    Some(ModalityBucket::CbctVerification)
                } else {
                    None
                }
            }
        }
    }

    /// Whether files in this bucket are organized into dated subdirectories
    pub fn is_dated(&self) -> bool {
        matches!(
            self,
            ModalityBucket::CtPlanning | ModalityBucket::CbctVerification
        )
    }

    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            ModalityBucket::CtPlanning => "CT planning",
            ModalityBucket::CbctVerification => "CBCT verification",
            ModalityBucket::StructureSet => "structure set",
            ModalityBucket::Plan => "plan",
            ModalityBucket::Dose => "dose",
            ModalityBucket::OtherImage => "other image",
            ModalityBucket::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for ModalityBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

/// How a classification was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(rename_all = "lowercase"))]
pub enum Confidence {
    /// No rule fired
    None,
    /// Filename prefix rule (operator-controlled, weakest signal)
    Filename,
    /// Metadata modality tag (wins over filename on disagreement)
    Metadata,
    /// Statistically inferred by the cross-validator; audit before trusting
    Statistical,
}

impl Confidence {
    /// Returns simple name for display
    pub fn simple_name(&self) -> &'static str {
        match self {
            Confidence::None => "none",
            Confidence::Filename => "filename",
            Confidence::Metadata => "metadata",
            Confidence::Statistical => "statistical",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.simple_name())
    }
}

/// Canonical-member selection policy for duplicate groups
///
/// Keeping the smallest file is a domain heuristic (truncated or
/// placeholder exports are observed to be the larger files in some
/// pipelines), not a universal rule; the policy is pluggable for that
/// reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
#[cfg_attr(feature = "json", serde(rename_all = "kebab-case"))]
pub enum CanonicalPolicy {
    /// Keep the smallest file (documented default)
    #[default]
    SmallestSize,
    /// Keep the largest file
    LargestSize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("CT.25001565.Image 1.dcm", Some(ModalityBucket::CtPlanning))]
    #[case("RI.25001565.MV_1.dcm", Some(ModalityBucket::CbctVerification))]
    #[case("RS.25001565.Plan1.dcm", Some(ModalityBucket::StructureSet))]
    #[case("RT.25001565.Rec.dcm", Some(ModalityBucket::Plan))]
    #[case("RP.25001565.Plan.dcm", Some(ModalityBucket::Plan))]
    #[case("RD.25001565.Dose.dcm", Some(ModalityBucket::Dose))]
    #[case("image042.dcm", None)]
    fn test_from_filename_prefix(#[case] name: &str, #[case] expected: Option<ModalityBucket>) {
        assert_eq!(ModalityBucket::from_filename_prefix(name), expected);
    }

    #[rstest]
    #[case("CT", Some(ModalityBucket::CtPlanning))]
    #[case("RTIMAGE", Some(ModalityBucket::CbctVerification))]
    #[case("ri", Some(ModalityBucket::CbctVerification))]
    #[case("cone-beam ct", Some(ModalityBucket::CbctVerification))]
    #[case("RTSTRUCT", Some(ModalityBucket::StructureSet))]
    #[case("RTPLAN", Some(ModalityBucket::Plan))]
    #[case("RTRECORD", Some(ModalityBucket::Plan))]
    #[case("RTDOSE", Some(ModalityBucket::Dose))]
    #[case("MR", Some(ModalityBucket::OtherImage))]
    #[case("SR", None)]
    fn test_from_modality(#[case] modality: &str, #[case] expected: Option<ModalityBucket>) {
        assert_eq!(ModalityBucket::from_modality(modality), expected);
    }

    #[test]
    fn test_bucket_dir_roundtrip() {
        for bucket in [
            ModalityBucket::CtPlanning,
            ModalityBucket::CbctVerification,
            ModalityBucket::StructureSet,
            ModalityBucket::Plan,
            ModalityBucket::Dose,
            ModalityBucket::OtherImage,
            ModalityBucket::Unclassified,
        ] {
            assert_eq!(ModalityBucket::from_bucket_dir(bucket.bucket_dir()), Some(bucket));
        }
        assert_eq!(ModalityBucket::from_bucket_dir("duplicates"), None);
    }

    #[test]
    fn test_is_dated() {
        assert!(ModalityBucket::CtPlanning.is_dated());
        assert!(ModalityBucket::CbctVerification.is_dated());
        assert!(!ModalityBucket::StructureSet.is_dated());
        assert!(!ModalityBucket::Plan.is_dated());
        assert!(!ModalityBucket::Dose.is_dated());
        assert!(!ModalityBucket::Unclassified.is_dated());
    }

    #[test]
    fn test_default_canonical_policy() {
        assert_eq!(CanonicalPolicy::default(), CanonicalPolicy::SmallestSize);
    }
}
