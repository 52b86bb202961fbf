use crate::error::Result;
use crate::extraction::MetadataSource;
use crate::scan::collect_dicom_files;
use crate::types::{Confidence, ImageRecord, ModalityBucket};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

/// Minimum ratio across the largest size gap for a split to be trusted
///
/// Below this the distribution is considered unimodal and no statistical
/// assignment is made; this is a confidence floor, not a guarantee of
/// correctness.
pub const MIN_GAP_RATIO: f64 = 1.2;

/// IQR multiplier for file-size outlier flagging
const IQR_FACTOR: f64 = 1.5;

/// Computes the size threshold splitting a batch into two clusters
///
/// Sorts the sizes, finds the largest gap between consecutive values and
/// returns the midpoint of that gap. Returns `None` when the batch has
/// fewer than two members or the gap ratio (upper edge over lower edge)
/// stays under [`MIN_GAP_RATIO`].
pub fn size_split_threshold(sizes: &[u64]) -> Option<u64> {
    if sizes.len() < 2 {
        return None;
    }
    let mut sorted = sizes.to_vec();
    sorted.sort_unstable();

    let mut best: Option<(u64, u64, u64)> = None; // (gap, lower, upper)
    for pair in sorted.windows(2) {
        let (lower, upper) = (pair[0], pair[1]);
        let gap = upper - lower;
        if best.map_or(true, |(g, _, _)| gap > g) {
            best = Some((gap, lower, upper));
        }
    }

    let (gap, lower, upper) = best?;
    if gap == 0 || lower == 0 {
        return None;
    }
    if (upper as f64) / (lower as f64) < MIN_GAP_RATIO {
        return None;
    }
    Some(lower + gap / 2)
}

/// Statistically assigns CT/CBCT buckets to one patient's ambiguous batch
///
/// Records above the split threshold become planning CT, records below
/// become verification CBCT, with [`Confidence::Statistical`] so the
/// summary can report them as inferred. Without a discernible gap nothing
/// is touched: unclassified records stay unclassified, conflicted records
/// keep their metadata ruling.
///
/// Returns the number of records assigned.
pub fn cross_validate(batch: &mut [&mut ImageRecord]) -> usize {
    let sizes: Vec<u64> = batch.iter().map(|r| r.size_bytes).collect();
    let Some(threshold) = size_split_threshold(&sizes) else {
        debug!(
            "cross-validation: no discernible size gap in batch of {}",
            batch.len()
        );
        return 0;
    };

    let mut assigned = 0;
    for record in batch.iter_mut() {
        let inferred = if record.size_bytes > threshold {
            ModalityBucket::CtPlanning
        } else {
            ModalityBucket::CbctVerification
        };
        if record.bucket != ModalityBucket::Unclassified && record.bucket != inferred {
            warn!(
                "cross-validation overrides {} ruling for {}: {} -> {}",
                record.confidence,
                record.path.display(),
                record.bucket,
                inferred
            );
        }
        record.bucket = inferred;
        record.confidence = Confidence::Statistical;
        assigned += 1;
    }
    assigned
}

/// Size and resolution statistics for one (patient, bucket) group
#[derive(Debug, Clone)]
pub struct ModalityStats {
    pub patient_id: String,
    pub bucket_dir: String,
    pub file_count: usize,
    pub min_size: u64,
    pub max_size: u64,
    pub mean_size: f64,
    pub resolutions: BTreeSet<String>,
}

/// A file whose size falls outside the IQR fences of its group
#[derive(Debug, Clone)]
pub struct SizeOutlier {
    pub path: PathBuf,
    pub patient_id: String,
    pub bucket_dir: String,
    pub size_bytes: u64,
    pub lower_bound: f64,
    pub upper_bound: f64,
}

/// Statistics report over an organized tree
#[derive(Debug, Default)]
pub struct StatsReport {
    pub stats: Vec<ModalityStats>,
    pub outliers: Vec<SizeOutlier>,
    pub errors: Vec<(PathBuf, String)>,
}

/// Analyzes size/resolution distributions over an organized tree
///
/// Groups files by (patient, bucket directory) and reports per-group
/// statistics plus IQR-based (1.5x) file-size outliers, so operators can
/// audit the distributions the statistical split relies on.
pub fn analyze_tree<S: MetadataSource + ?Sized>(root: &Path, source: &S) -> Result<StatsReport> {
    let files = collect_dicom_files(root)?;
    let mut report = StatsReport::default();
    let mut groups: BTreeMap<(String, String), Vec<(PathBuf, u64, Option<String>)>> =
        BTreeMap::new();

    for path in files {
        let rel = match path.strip_prefix(root) {
            Ok(r) => r,
            Err(_) => continue,
        };
        let mut components = rel.components().map(|c| c.as_os_str().to_string_lossy());
        let (Some(patient), Some(bucket)) = (components.next(), components.next()) else {
            continue;
        };
        if patient == "duplicates" {
            continue;
        }

        let size = match fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                report.errors.push((path.clone(), e.to_string()));
                continue;
            }
        };
        let resolution = match source.read_metadata(&path) {
            Ok(meta) => match (meta.rows, meta.columns) {
                (Some(r), Some(c)) => Some(format!("{}x{}", r, c)),
                _ => None,
            },
            Err(e) => {
                report.errors.push((path.clone(), e.to_string()));
                None
            }
        };

        groups
            .entry((patient.to_string(), bucket.to_string()))
            .or_default()
            .push((path, size, resolution));
    }

    for ((patient_id, bucket_dir), members) in groups {
        let sizes: Vec<u64> = members.iter().map(|(_, s, _)| *s).collect();
        let total: u64 = sizes.iter().sum();
        let stats = ModalityStats {
            patient_id: patient_id.clone(),
            bucket_dir: bucket_dir.clone(),
            file_count: members.len(),
            min_size: sizes.iter().copied().min().unwrap_or(0),
            max_size: sizes.iter().copied().max().unwrap_or(0),
            mean_size: total as f64 / members.len() as f64,
            resolutions: members
                .iter()
                .filter_map(|(_, _, res)| res.clone())
                .collect(),
        };
        report.stats.push(stats);

        // IQR fences need a few members to mean anything
        if members.len() >= 4 {
            let mut sorted = sizes.clone();
            sorted.sort_unstable();
            let (q1, q3) = quartiles(&sorted);
            let iqr = q3 - q1;
            let lower = q1 - IQR_FACTOR * iqr;
            let upper = q3 + IQR_FACTOR * iqr;
            for (path, size, _) in &members {
                let s = *size as f64;
                if s < lower || s > upper {
                    report.outliers.push(SizeOutlier {
                        path: path.clone(),
                        patient_id: patient_id.clone(),
                        bucket_dir: bucket_dir.clone(),
                        size_bytes: *size,
                        lower_bound: lower,
                        upper_bound: upper,
                    });
                }
            }
        }
    }

    Ok(report)
}

/// First and third quartiles with linear interpolation
fn quartiles(sorted: &[u64]) -> (f64, f64) {
    let q = |p: f64| {
        let idx = p * (sorted.len() - 1) as f64;
        let lo = idx.floor() as usize;
        let hi = idx.ceil() as usize;
        let frac = idx - lo as f64;
        sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
    };
    (q(0.25), q(0.75))
}
