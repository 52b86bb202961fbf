use crate::dedup::DUPLICATES_DIR;
use crate::error::Result;
use crate::scan::collect_dicom_files;
use crate::types::{AcquisitionDate, ModalityBucket};
use log::info;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A structural invariant broken somewhere in an organized tree
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum Violation {
    /// A patient's CT directory holds more than one date
    MultipleCtDates {
        patient_id: String,
        dates: Vec<String>,
    },
    /// Filename prefix contradicts the bucket directory the file sits in
    BucketPrefixMismatch {
        path: PathBuf,
        expected: ModalityBucket,
        found: ModalityBucket,
    },
    /// Same file name under several dates of one patient bucket
    RepeatedAcrossDates {
        patient_id: String,
        bucket: ModalityBucket,
        file_name: String,
        dates: Vec<String>,
    },
    /// Directory at the bucket level that is not a known bucket
    UnknownBucketDir { path: PathBuf },
    /// Date-level directory that parses as neither a date nor the sentinel
    InvalidDateDir { path: PathBuf },
    /// Input file with no counterpart anywhere in the organized tree
    MissingFromOutput { path: PathBuf },
    /// File name present in several unrelated places in the tree
    AppearsMultipleTimes {
        file_name: String,
        paths: Vec<PathBuf>,
    },
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::MultipleCtDates { patient_id, dates } => write!(
                f,
                "patient {}: CT holds {} dates ({})",
                patient_id,
                dates.len(),
                dates.join(", ")
            ),
            Violation::BucketPrefixMismatch {
                path,
                expected,
                found,
            } => write!(
                f,
                "{}: prefix says {} but file sits under {}",
                path.display(),
                expected,
                found
            ),
            Violation::RepeatedAcrossDates {
                patient_id,
                bucket,
                file_name,
                dates,
            } => write!(
                f,
                "patient {}: {} appears under {} {} dates ({})",
                patient_id,
                file_name,
                dates.len(),
                bucket,
                dates.join(", ")
            ),
            Violation::UnknownBucketDir { path } => {
                write!(f, "{}: not a recognized bucket directory", path.display())
            }
            Violation::InvalidDateDir { path } => {
                write!(f, "{}: not a valid date directory", path.display())
            }
            Violation::MissingFromOutput { path } => {
                write!(f, "{}: missing from the organized tree", path.display())
            }
            Violation::AppearsMultipleTimes { file_name, paths } => write!(
                f,
                "{}: appears {} times in the tree",
                file_name,
                paths.len()
            ),
        }
    }
}

/// Checks an organized tree against its structural invariants
///
/// Read-only; never repairs anything. With `input_dir` given, completeness
/// is checked too: every input file name must appear somewhere in the tree
/// (the `duplicates/` quarantine counts as accounted for).
///
/// CT-vs-CBCT prefix mismatches are tolerated because date demotion and
/// metadata overrides legitimately move files between those two buckets;
/// any other prefix disagreement is reported.
pub fn verify(root: &Path, input_dir: Option<&Path>) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    // Every file name in the non-quarantine tree, for the global checks
    let mut placements: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
    let mut quarantined: BTreeSet<String> = BTreeSet::new();

    for patient_dir in sorted_subdirs(root)? {
        let patient_id = name_of(&patient_dir);
        if patient_id == DUPLICATES_DIR {
            for path in collect_dicom_files(&patient_dir)? {
                quarantined.insert(name_of(&path));
            }
            continue;
        }

        for bucket_dir in sorted_subdirs(&patient_dir)? {
            let bucket_name = name_of(&bucket_dir);
            let Some(bucket) = ModalityBucket::from_bucket_dir(&bucket_name) else {
                violations.push(Violation::UnknownBucketDir { path: bucket_dir });
                continue;
            };

            if bucket.is_dated() {
                let mut name_dates: BTreeMap<String, Vec<String>> = BTreeMap::new();
                let mut ct_dates = Vec::new();
                for date_dir in sorted_subdirs(&bucket_dir)? {
                    let date_name = name_of(&date_dir);
                    if AcquisitionDate::from_dir_name(&date_name).is_none() {
                        violations.push(Violation::InvalidDateDir {
                            path: date_dir.clone(),
                        });
                    } else if bucket == ModalityBucket::CtPlanning {
                        ct_dates.push(date_name.clone());
                    }
                    for file in sorted_files(&date_dir)? {
                        let file_name = name_of(&file);
                        check_prefix(&file, bucket, &mut violations);
                        name_dates
                            .entry(file_name.clone())
                            .or_default()
                            .push(date_name.clone());
                        placements.entry(file_name).or_default().push(file);
                    }
                }

                if ct_dates.len() > 1 {
                    violations.push(Violation::MultipleCtDates {
                        patient_id: patient_id.clone(),
                        dates: ct_dates,
                    });
                }
                for (file_name, dates) in name_dates {
                    if dates.len() > 1 {
                        violations.push(Violation::RepeatedAcrossDates {
                            patient_id: patient_id.clone(),
                            bucket,
                            file_name,
                            dates,
                        });
                    }
                }
            } else {
                for file in sorted_files(&bucket_dir)? {
                    check_prefix(&file, bucket, &mut violations);
                    placements.entry(name_of(&file)).or_default().push(file);
                }
            }
        }
    }

    // A name repeated within one dated bucket is already reported above;
    // this catches the same name surfacing in unrelated places.
    for (file_name, paths) in &placements {
        if paths.len() > 1 && !same_dated_bucket(root, paths) {
            violations.push(Violation::AppearsMultipleTimes {
                file_name: file_name.clone(),
                paths: paths.clone(),
            });
        }
    }

    if let Some(input) = input_dir {
        for path in collect_dicom_files(input)? {
            let file_name = name_of(&path);
            if !placements.contains_key(&file_name) && !quarantined.contains(&file_name) {
                violations.push(Violation::MissingFromOutput { path });
            }
        }
    }

    info!("verification found {} violations", violations.len());
    Ok(violations)
}

fn check_prefix(path: &Path, dir_bucket: ModalityBucket, violations: &mut Vec<Violation>) {
    let file_name = name_of(path);
    let Some(prefix_bucket) = ModalityBucket::from_filename_prefix(&file_name) else {
        return;
    };
    if prefix_bucket == dir_bucket {
        return;
    }
    let ct_family = [
        ModalityBucket::CtPlanning,
        ModalityBucket::CbctVerification,
    ];
    if ct_family.contains(&prefix_bucket) && ct_family.contains(&dir_bucket) {
        return;
    }
    violations.push(Violation::BucketPrefixMismatch {
        path: path.to_path_buf(),
        expected: prefix_bucket,
        found: dir_bucket,
    });
}

/// Whether all paths sit under the same patient's same dated bucket
fn same_dated_bucket(root: &Path, paths: &[PathBuf]) -> bool {
    let mut scopes = BTreeSet::new();
    for path in paths {
        let Ok(rel) = path.strip_prefix(root) else {
            return false;
        };
        let mut components = rel.components().map(|c| c.as_os_str().to_string_lossy());
        let (Some(patient), Some(bucket)) = (components.next(), components.next()) else {
            return false;
        };
        match ModalityBucket::from_bucket_dir(&bucket) {
            Some(b) if b.is_dated() => {
                scopes.insert((patient.to_string(), bucket.to_string()));
            }
            _ => return false,
        }
    }
    scopes.len() == 1
}

fn sorted_subdirs(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn sorted_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}
