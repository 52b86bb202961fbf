//! Radiotherapy DICOM organization toolkit
//!
//! Takes flat exports of radiotherapy DICOM files (planning CT slices,
//! CBCT verification images, RT structure sets, plans and doses) and
//! organizes them into a per-patient, per-modality, per-date hierarchy:
//!
//! ```text
//! organized_dicom/
//!   <patient_id>/
//!     CT/<date>/        planning CT, exactly one date per patient
//!     CBCT/<date>/      verification imaging, one date per session
//!     RS/  RT/  RD/     structure sets, plans, doses (flat)
//!     other/  unclassified/
//! ```
//!
//! Classification combines the filename prefix convention with DICOM
//! metadata, falling back to per-patient statistical cross-validation for
//! files neither rule can settle. Companion passes find duplicates inside
//! the organized tree ([`detect_duplicates`]) and check its structural
//! invariants ([`verify`]).

pub mod classify;
pub mod cli;
pub mod crossval;
pub mod dedup;
pub mod error;
pub mod extraction;
pub mod organize;
pub mod scan;
pub mod types;
pub mod verify;

pub use classify::{classify, Classification};
pub use crossval::{
    analyze_tree, cross_validate, size_split_threshold, ModalityStats, SizeOutlier, StatsReport,
    MIN_GAP_RATIO,
};
pub use dedup::{
    detect_duplicates, DedupOptions, DedupReport, DuplicateAction, DuplicateGroup, GroupMember,
    IdentityKey, DUPLICATES_DIR,
};
pub use error::{ExtractError, Result, RtsortError};
pub use extraction::{DicomExtractor, DicomMetadata, MetadataSource};
pub use organize::{
    organize, OrganizeOptions, PlacementMode, SummaryReport, SummaryRow, SUMMARY_REPORT_FILE,
};
pub use scan::{collect_dicom_files, is_dicom_file};
pub use types::{
    AcquisitionDate, CanonicalPolicy, Confidence, ImageRecord, ModalityBucket, UNKNOWN_DATE_DIR,
};
pub use verify::{verify, Violation};
