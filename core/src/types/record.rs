use crate::types::{AcquisitionDate, Confidence, ModalityBucket};
use std::path::PathBuf;

/// One physical input file after classification
///
/// Created when extraction succeeds; files whose extraction fails or whose
/// patient id is empty never become records and are excluded from
/// organization (reported, not deleted). The bucket is assigned once during
/// the finalize phase and immutable afterwards.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    /// Path to the source file
    pub path: PathBuf,

    /// Patient identifier (always non-empty)
    pub patient_id: String,

    /// Modality bucket this record was assigned to
    pub bucket: ModalityBucket,

    /// How the bucket was decided
    pub confidence: Confidence,

    /// Acquisition date, or the unknown sentinel
    pub date: AcquisitionDate,

    /// SOP Instance UID, when present
    pub sop_instance_uid: Option<String>,

    /// File size in bytes
    pub size_bytes: u64,

    /// Pixel grid rows
    pub rows: Option<u16>,

    /// Pixel grid columns
    pub columns: Option<u16>,
}

impl ImageRecord {
    /// The file name component of the source path
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

}
