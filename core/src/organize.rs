use crate::classify::classify;
use crate::crossval::cross_validate;
use crate::error::{ExtractError, Result, RtsortError};
use crate::extraction::MetadataSource;
use crate::scan::{collect_dicom_files, xxh3_file};
use crate::types::{AcquisitionDate, ImageRecord, ModalityBucket};
use indicatif::ParallelProgressIterator;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// How files are materialized in the organized tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacementMode {
    /// Duplicate the bytes (safe, space-costly)
    Copy,
    /// Symlink to the source (space-efficient, but the organized tree is
    /// not standalone: moving or deleting the source corrupts it)
    Link,
}

/// Organizer options
#[derive(Debug, Clone, Copy)]
pub struct OrganizeOptions {
    pub mode: PlacementMode,
    pub workers: usize,
}

impl Default for OrganizeOptions {
    fn default() -> Self {
        Self {
            mode: PlacementMode::Copy,
            workers: 4,
        }
    }
}

/// One aggregate count row: (patient, bucket, date) -> files placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    pub patient_id: String,
    pub bucket: ModalityBucket,
    /// `None` for buckets without dated sub-structure
    pub date: Option<AcquisitionDate>,
    pub count: usize,
}

/// Aggregate outcome of one organize run
///
/// Write-only and derived; generated once after all workers complete and
/// never mutated afterwards.
#[derive(Debug, Default)]
pub struct SummaryReport {
    /// Count rows, sorted by (patient, bucket, date)
    pub rows: Vec<SummaryRow>,

    /// Files placed into the tree (including re-runs finding them present)
    pub placed: usize,

    /// Files routed to the `unclassified/` bucket
    pub unclassified: Vec<PathBuf>,

    /// Files skipped before classification (extraction failures)
    pub skipped: Vec<(PathBuf, String)>,

    /// Per-file placement failures (after one retry)
    pub failures: Vec<(PathBuf, String)>,

    /// Records whose bucket was statistically inferred by the cross-validator
    pub inferred: usize,

    /// CT-labeled files demoted to CBCT by the earliest-date policy
    pub demoted_ct: usize,
}

impl SummaryReport {
    /// Whether the run finished with non-fatal per-file issues
    pub fn has_warnings(&self) -> bool {
        !self.skipped.is_empty() || !self.failures.is_empty()
    }

    /// Total files counted across all rows
    pub fn total_placed(&self) -> usize {
        self.rows.iter().map(|r| r.count).sum()
    }

    /// Writes the tabular artifact (patient_id, bucket, date, count)
    pub fn write_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut out = std::io::BufWriter::new(fs::File::create(path)?);
        writeln!(out, "patient_id,bucket,date,count")?;
        for row in &self.rows {
            writeln!(
                out,
                "{},{},{},{}",
                row.patient_id,
                row.bucket.bucket_dir(),
                row.date.map(|d| d.dir_name()).unwrap_or_default(),
                row.count
            )?;
        }
        out.flush()
    }
}

/// Name of the tabular artifact written to the output root
pub const SUMMARY_REPORT_FILE: &str = "summary_report.csv";

struct Staged {
    record: ImageRecord,
    conflict: bool,
}

#[derive(Default)]
struct PatientOutcome {
    rows: BTreeMap<(ModalityBucket, Option<AcquisitionDate>), usize>,
    unclassified: Vec<PathBuf>,
    failures: Vec<(PathBuf, String)>,
    placed: usize,
    inferred: usize,
    demoted_ct: usize,
}

/// Reorganizes a flat DICOM collection into the per-patient hierarchy
///
/// Two phases. Phase 1 classifies and stages every input file in parallel
/// (order-independent, no shared mutable state). Phase 2 finalizes per
/// patient (cross-validation of the ambiguous batch, earliest-CT-date
/// collapsing, then physical placement) sequentially within a patient,
/// patients in parallel. Destination paths and counts are deterministic
/// for a given input set regardless of worker scheduling.
///
/// No single file's failure aborts the run; only configuration errors are
/// fatal here.
pub fn organize<S: MetadataSource + ?Sized>(
    input_dir: &Path,
    output_dir: &Path,
    opts: OrganizeOptions,
    source: &S,
) -> Result<SummaryReport> {
    if !input_dir.is_dir() {
        return Err(RtsortError::Config(format!(
            "input path {} is not a directory",
            input_dir.display()
        )));
    }
    if opts.workers == 0 {
        return Err(RtsortError::Config("worker count must be at least 1".into()));
    }

    let files = collect_dicom_files(input_dir)?;
    info!("found {} DICOM files under {}", files.len(), input_dir.display());
    if files.is_empty() {
        return Ok(SummaryReport::default());
    }

    fs::create_dir_all(output_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.workers)
        .build()
        .map_err(|e| RtsortError::ThreadPool(e.to_string()))?;

    // Phase 1: classify and stage, embarrassingly parallel per file.
    let staged_results: Vec<std::result::Result<Staged, (PathBuf, ExtractError)>> =
        pool.install(|| {
            files
                .par_iter()
                .progress_count(files.len() as u64)
                .map(|path| stage_file(path, source))
                .collect()
        });

    let mut report = SummaryReport::default();
    let mut staged = Vec::new();
    for result in staged_results {
        match result {
            Ok(s) => staged.push(s),
            Err((path, err)) => {
                warn!("skipping {}: {}", path.display(), err);
                report.skipped.push((path, err.to_string()));
            }
        }
    }
    staged.sort_by(|a, b| a.record.path.cmp(&b.record.path));

    let mut by_patient: BTreeMap<String, Vec<Staged>> = BTreeMap::new();
    for s in staged {
        by_patient.entry(s.record.patient_id.clone()).or_default().push(s);
    }

    // Phase 2: per-patient finalize; patients are independent and run in
    // parallel, everything within one patient is sequential.
    let patients: Vec<(String, Vec<Staged>)> = by_patient.into_iter().collect();
    let outcomes: Vec<(String, PatientOutcome)> = pool.install(|| {
        patients
            .into_par_iter()
            .map(|(patient_id, records)| {
                let outcome = finalize_patient(&patient_id, records, output_dir, opts.mode);
                (patient_id, outcome)
            })
            .collect()
    });

    for (patient_id, outcome) in outcomes {
        for ((bucket, date), count) in outcome.rows {
            report.rows.push(SummaryRow {
                patient_id: patient_id.clone(),
                bucket,
                date,
                count,
            });
        }
        report.placed += outcome.placed;
        report.unclassified.extend(outcome.unclassified);
        report.failures.extend(outcome.failures);
        report.inferred += outcome.inferred;
        report.demoted_ct += outcome.demoted_ct;
    }

    report.write_csv(&output_dir.join(SUMMARY_REPORT_FILE))?;
    info!(
        "organized {} files ({} skipped, {} placement failures)",
        report.placed,
        report.skipped.len(),
        report.failures.len()
    );
    Ok(report)
}

fn stage_file<S: MetadataSource + ?Sized>(
    path: &Path,
    source: &S,
) -> std::result::Result<Staged, (PathBuf, ExtractError)> {
    let meta = source
        .read_metadata(path)
        .map_err(|e| (path.to_path_buf(), e))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let c = classify(&file_name, &meta);

    Ok(Staged {
        record: ImageRecord {
            path: path.to_path_buf(),
            patient_id: meta.patient_id,
            bucket: c.bucket,
            confidence: c.confidence,
            date: c.date,
            sop_instance_uid: meta.sop_instance_uid,
            size_bytes: meta.size_bytes,
            rows: meta.rows,
            columns: meta.columns,
        },
        conflict: c.ct_cbct_conflict,
    })
}

/// Finalizes one patient: cross-validation, CT-date collapsing, placement
///
/// Needs full visibility into the patient's file set, which is why it runs
/// after the parallel staging phase rather than as streaming placement.
fn finalize_patient(
    patient_id: &str,
    mut records: Vec<Staged>,
    output_dir: &Path,
    mode: PlacementMode,
) -> PatientOutcome {
    let mut outcome = PatientOutcome::default();

    // Cross-validate the ambiguous batch: unclassified records plus
    // CT-vs-CBCT filename/metadata conflicts.
    {
        let mut batch: Vec<&mut ImageRecord> = records
            .iter_mut()
            .filter(|s| s.conflict || s.record.bucket == ModalityBucket::Unclassified)
            .map(|s| &mut s.record)
            .collect();
        if batch.len() >= 2 {
            let assigned = cross_validate(&mut batch);
            if assigned > 0 {
                debug!(
                    "patient {}: statistically classified {} ambiguous files",
                    patient_id, assigned
                );
            }
            outcome.inferred += assigned;
        }
    }

    // Collapse CT dates: a patient has one planning CT by convention, so
    // only the earliest date stays; later CT-labeled files are demoted to
    // verification imaging and flagged in the summary.
    let earliest_ct = records
        .iter()
        .filter(|s| s.record.bucket == ModalityBucket::CtPlanning)
        .map(|s| s.record.date)
        .min();
    if let Some(earliest) = earliest_ct {
        for s in records
            .iter_mut()
            .filter(|s| s.record.bucket == ModalityBucket::CtPlanning)
        {
            if s.record.date != earliest {
                warn!(
                    "patient {}: demoting CT-labeled {} ({}) to CBCT, planning CT is {}",
                    patient_id,
                    s.record.file_name(),
                    s.record.date,
                    earliest
                );
                s.record.bucket = ModalityBucket::CbctVerification;
                outcome.demoted_ct += 1;
            }
        }
    }

    // Deterministic placement order: records arrive path-sorted, keep it.
    for s in &records {
        let record = &s.record;
        let mut dest_dir = output_dir.join(patient_id).join(record.bucket.bucket_dir());
        if record.bucket.is_dated() {
            dest_dir = dest_dir.join(record.date.dir_name());
        }

        if let Err(e) = fs::create_dir_all(&dest_dir) {
            outcome
                .failures
                .push((record.path.clone(), format!("create {}: {}", dest_dir.display(), e)));
            continue;
        }

        let dest = dest_dir.join(record.file_name());
        if dest.exists() {
            // Existing destination counts only if it holds the same bytes
            // (idempotent re-run). A different payload under the same name
            // is a distinct image that must not vanish into the count.
            match same_content(&record.path, &dest) {
                Ok(true) => {}
                Ok(false) => {
                    warn!(
                        "name collision: {} differs from existing {}",
                        record.path.display(),
                        dest.display()
                    );
                    outcome.failures.push((
                        record.path.clone(),
                        format!(
                            "destination {} already holds different content",
                            dest.display()
                        ),
                    ));
                    continue;
                }
                Err(e) => {
                    outcome
                        .failures
                        .push((record.path.clone(), format!("compare {}: {}", dest.display(), e)));
                    continue;
                }
            }
        } else {
            // One retry, then this file alone is recorded as failed.
            if let Err(first) = place_file(&record.path, &dest, mode) {
                debug!("retrying placement of {}: {}", record.path.display(), first);
                if let Err(second) = place_file(&record.path, &dest, mode) {
                    outcome
                        .failures
                        .push((record.path.clone(), second.to_string()));
                    continue;
                }
            }
        }

        let date_key = record.bucket.is_dated().then_some(record.date);
        *outcome.rows.entry((record.bucket, date_key)).or_default() += 1;
        outcome.placed += 1;
        if record.bucket == ModalityBucket::Unclassified {
            outcome.unclassified.push(record.path.clone());
        }
    }

    outcome
}

/// Whether two files hold identical bytes (size check, then xxh3)
fn same_content(a: &Path, b: &Path) -> std::io::Result<bool> {
    if fs::metadata(a)?.len() != fs::metadata(b)?.len() {
        return Ok(false);
    }
    Ok(xxh3_file(a)? == xxh3_file(b)?)
}

fn place_file(src: &Path, dest: &Path, mode: PlacementMode) -> std::io::Result<()> {
    match mode {
        PlacementMode::Copy => fs::copy(src, dest).map(|_| ()),
        PlacementMode::Link => {
            let absolute = src.canonicalize()?;
            symlink_file(&absolute, dest).or_else(|e| {
                // Filesystems without symlink support fall back to a copy.
                debug!(
                    "symlink {} -> {} failed ({}), copying instead",
                    dest.display(),
                    absolute.display(),
                    e
                );
                fs::copy(src, dest).map(|_| ())
            })
        }
    }
}

#[cfg(unix)]
fn symlink_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(src, dest)
}

#[cfg(windows)]
fn symlink_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(src, dest)
}
