use crate::error::{Result, RtsortError};
use crate::extraction::MetadataSource;
use crate::scan::xxh3_file;
use crate::types::{CanonicalPolicy, ModalityBucket};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Quarantine directory under the organized root
///
/// Excluded from scanning, so resolving duplicates by moving them is
/// idempotent: a second run over the same tree finds nothing.
pub const DUPLICATES_DIR: &str = "duplicates";

/// What to do with the non-canonical members of each duplicate group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateAction {
    /// List groups without touching the tree
    Report,
    /// Relocate non-canonical members under `duplicates/`, preserving their
    /// relative path for provenance
    Move,
    /// Remove non-canonical members outright
    Delete,
}

/// Identity under which files in one scope are considered duplicates
///
/// Tiered: the SOP Instance UID is authoritative when present; files
/// without one fall back to a full-content hash, and files that cannot be
/// hashed fall back to a weak size/resolution fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum IdentityKey {
    Uid(String),
    ContentHash(u64),
    Fingerprint {
        size_bytes: u64,
        rows: u16,
        columns: u16,
    },
}

/// One file in a duplicate group
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct GroupMember {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// The retained member; exactly one per group
    pub canonical: bool,
}

/// A set of files sharing an identity within one scope
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct DuplicateGroup {
    pub patient_id: String,
    pub bucket: ModalityBucket,
    /// Date directory name for dated buckets, `None` otherwise
    pub date: Option<String>,
    pub key: IdentityKey,
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    /// Members that are not the canonical one
    pub fn redundant(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| !m.canonical)
    }
}

/// Duplicate-detection options
#[derive(Debug, Clone, Copy)]
pub struct DedupOptions {
    pub action: DuplicateAction,
    /// Restrict scanning to planning CT directories
    pub ct_only: bool,
    pub policy: CanonicalPolicy,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            action: DuplicateAction::Report,
            ct_only: false,
            policy: CanonicalPolicy::default(),
        }
    }
}

/// Outcome of one duplicate-detection run
#[derive(Debug, Default)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub struct DedupReport {
    /// Groups in deterministic (patient, bucket, date, key) order
    pub groups: Vec<DuplicateGroup>,

    /// Non-canonical members acted on (moved or deleted)
    pub resolved: usize,

    /// Files left out of consideration, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

impl DedupReport {
    pub fn has_duplicates(&self) -> bool {
        !self.groups.is_empty()
    }

    pub fn redundant_count(&self) -> usize {
        self.groups.iter().map(|g| g.redundant().count()).sum()
    }
}

/// Detects (and optionally resolves) duplicates in an organized tree
///
/// Scope is the invariant: two files are compared only within the same
/// (patient, bucket, date) directory, never across patients or sessions.
/// Identity is tiered per [`IdentityKey`]. Within each group the canonical
/// member is chosen by the policy (size, then lexicographic path as the
/// tie-break) and the rest are reported, moved or deleted per the action.
pub fn detect_duplicates<S: MetadataSource + ?Sized>(
    root: &Path,
    opts: DedupOptions,
    source: &S,
) -> Result<DedupReport> {
    if !root.is_dir() {
        return Err(RtsortError::Config(format!(
            "organized path {} is not a directory",
            root.display()
        )));
    }

    let mut report = DedupReport::default();

    for patient_dir in sorted_subdirs(root)? {
        let patient_id = dir_name(&patient_dir);
        if patient_id == DUPLICATES_DIR {
            continue;
        }

        for bucket_dir in sorted_subdirs(&patient_dir)? {
            let Some(bucket) = ModalityBucket::from_bucket_dir(&dir_name(&bucket_dir)) else {
                debug!("skipping unrecognized directory {}", bucket_dir.display());
                continue;
            };
            if opts.ct_only && bucket != ModalityBucket::CtPlanning {
                continue;
            }

            if bucket.is_dated() {
                for date_dir in sorted_subdirs(&bucket_dir)? {
                    let date = dir_name(&date_dir);
                    process_scope(
                        root,
                        &date_dir,
                        &patient_id,
                        bucket,
                        Some(date),
                        opts,
                        source,
                        &mut report,
                    )?;
                }
            } else {
                process_scope(
                    root, &bucket_dir, &patient_id, bucket, None, opts, source, &mut report,
                )?;
            }
        }
    }

    info!(
        "found {} duplicate groups ({} redundant files, {} resolved)",
        report.groups.len(),
        report.redundant_count(),
        report.resolved
    );
    Ok(report)
}

#[allow(clippy::too_many_arguments)]
fn process_scope<S: MetadataSource + ?Sized>(
    root: &Path,
    scope_dir: &Path,
    patient_id: &str,
    bucket: ModalityBucket,
    date: Option<String>,
    opts: DedupOptions,
    source: &S,
    report: &mut DedupReport,
) -> Result<()> {
    let mut files = Vec::new();
    for entry in fs::read_dir(scope_dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    if files.len() < 2 {
        return Ok(());
    }

    let mut by_key: BTreeMap<IdentityKey, Vec<(PathBuf, u64)>> = BTreeMap::new();
    let mut unkeyed: Vec<(PathBuf, u64, Option<(u16, u16)>)> = Vec::new();

    for path in files {
        let size = match fs::metadata(&path) {
            Ok(m) => m.len(),
            Err(e) => {
                report.skipped.push((path, format!("stat: {}", e)));
                continue;
            }
        };
        match source.read_metadata(&path) {
            Ok(meta) => match meta.sop_instance_uid {
                Some(uid) => by_key
                    .entry(IdentityKey::Uid(uid))
                    .or_default()
                    .push((path, size)),
                None => {
                    let resolution = meta.rows.zip(meta.columns);
                    unkeyed.push((path, size, resolution));
                }
            },
            Err(e) => {
                debug!("no metadata for {}: {}", path.display(), e);
                unkeyed.push((path, size, None));
            }
        }
    }

    // Files without a UID fall back to whole-content hashing, done in
    // parallel since it is the only IO-heavy step here.
    let hashed: Vec<(PathBuf, u64, Option<(u16, u16)>, std::io::Result<u64>)> = unkeyed
        .into_par_iter()
        .map(|(path, size, res)| {
            let digest = xxh3_file(&path);
            (path, size, res, digest)
        })
        .collect();
    for (path, size, resolution, digest) in hashed {
        match digest {
            Ok(h) => by_key
                .entry(IdentityKey::ContentHash(h))
                .or_default()
                .push((path, size)),
            Err(e) => match resolution {
                Some((rows, columns)) => by_key
                    .entry(IdentityKey::Fingerprint {
                        size_bytes: size,
                        rows,
                        columns,
                    })
                    .or_default()
                    .push((path, size)),
                None => {
                    warn!("cannot establish identity for {}: {}", path.display(), e);
                    report.skipped.push((path, format!("hash: {}", e)));
                }
            },
        }
    }

    for (key, mut members) in by_key {
        if members.len() < 2 {
            continue;
        }
        // Policy orders by size, path breaks ties; the first member is kept.
        members.sort_by(|(pa, sa), (pb, sb)| match opts.policy {
            CanonicalPolicy::SmallestSize => sa.cmp(sb).then_with(|| pa.cmp(pb)),
            CanonicalPolicy::LargestSize => sb.cmp(sa).then_with(|| pa.cmp(pb)),
        });

        let group = DuplicateGroup {
            patient_id: patient_id.to_string(),
            bucket,
            date: date.clone(),
            key,
            members: members
                .into_iter()
                .enumerate()
                .map(|(i, (path, size_bytes))| GroupMember {
                    path,
                    size_bytes,
                    canonical: i == 0,
                })
                .collect(),
        };

        if opts.action != DuplicateAction::Report {
            // Member paths stay as found, so the report shows where each
            // file was before the move.
            resolve_group(root, &group, opts.action, report);
        }
        report.groups.push(group);
    }

    Ok(())
}

fn resolve_group(
    root: &Path,
    group: &DuplicateGroup,
    action: DuplicateAction,
    report: &mut DedupReport,
) {
    for member in group.redundant() {
        let outcome = match action {
            DuplicateAction::Move => quarantine(root, &member.path),
            DuplicateAction::Delete => fs::remove_file(&member.path),
            DuplicateAction::Report => Ok(()),
        };
        match outcome {
            Ok(()) => report.resolved += 1,
            Err(e) => {
                warn!("could not resolve {}: {}", member.path.display(), e);
                report.skipped.push((member.path.clone(), e.to_string()));
            }
        }
    }
}

/// Moves a redundant file under `duplicates/`, keeping its relative path
fn quarantine(root: &Path, path: &Path) -> std::io::Result<()> {
    let rel = path
        .strip_prefix(root)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let dest = root.join(DUPLICATES_DIR).join(rel);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(path, dest)
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

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use crate::extraction::DicomMetadata;
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct StubSource(HashMap<String, DicomMetadata>);

    impl StubSource {
        fn new() -> Self {
            Self(HashMap::new())
        }

        fn with_uid(mut self, name: &str, uid: Option<&str>) -> Self {
            self.0.insert(
                name.to_string(),
                DicomMetadata {
                    patient_id: "7".to_string(),
                    modality: Some("CT".to_string()),
                    sop_instance_uid: uid.map(|s| s.to_string()),
                    acquisition_date: None,
                    content_date: None,
                    series_date: None,
                    study_date: None,
                    rows: Some(512),
                    columns: Some(512),
                    size_bytes: 0,
                },
            );
            self
        }
    }

    impl MetadataSource for StubSource {
        fn read_metadata(&self, path: &Path) -> std::result::Result<DicomMetadata, ExtractError> {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            self.0
                .get(&name)
                .cloned()
                .ok_or_else(|| ExtractError::NotReadable("no stub metadata".to_string()))
        }
    }

    fn write_file(root: &Path, rel: &str, contents: &[u8]) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_uid_duplicates_within_scope() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aaaa");
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"bbbbbbbb");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"));

        let report =
            detect_duplicates(root.path(), DedupOptions::default(), &source).unwrap();

        assert_eq!(report.groups.len(), 1);
        let group = &report.groups[0];
        assert_eq!(group.key, IdentityKey::Uid("1.2.3".to_string()));
        assert_eq!(group.patient_id, "7");
        assert_eq!(group.date.as_deref(), Some("2023-01-10"));
        // Smallest file is canonical
        let canonical: Vec<_> = group.members.iter().filter(|m| m.canonical).collect();
        assert_eq!(canonical.len(), 1);
        assert!(canonical[0].path.ends_with("a.dcm"));
        // Report action touches nothing
        assert_eq!(report.resolved, 0);
        assert!(root.path().join("7/CT/2023-01-10/b.dcm").is_file());
    }

    #[test]
    fn test_same_uid_in_different_scopes_is_not_a_duplicate() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aaaa");
        write_file(root.path(), "7/CBCT/2023-01-12/b.dcm", b"aaaa");
        write_file(root.path(), "8/CT/2023-01-10/c.dcm", b"aaaa");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"))
            .with_uid("c.dcm", Some("1.2.3"));

        let report =
            detect_duplicates(root.path(), DedupOptions::default(), &source).unwrap();
        assert!(report.groups.is_empty());
    }

    #[test]
    fn test_content_hash_fallback_without_uid() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/RS/a.dcm", b"same bytes");
        write_file(root.path(), "7/RS/b.dcm", b"same bytes");
        write_file(root.path(), "7/RS/c.dcm", b"different bytes");
        let source = StubSource::new()
            .with_uid("a.dcm", None)
            .with_uid("b.dcm", None)
            .with_uid("c.dcm", None);

        let report =
            detect_duplicates(root.path(), DedupOptions::default(), &source).unwrap();

        assert_eq!(report.groups.len(), 1);
        assert!(matches!(report.groups[0].key, IdentityKey::ContentHash(_)));
        assert_eq!(report.groups[0].members.len(), 2);
        assert_eq!(report.groups[0].date, None);
    }

    #[test]
    fn test_move_preserves_relative_path_and_is_idempotent() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aa");
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"bbbb");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"));

        let opts = DedupOptions {
            action: DuplicateAction::Move,
            ..DedupOptions::default()
        };
        let report = detect_duplicates(root.path(), opts, &source).unwrap();

        assert_eq!(report.resolved, 1);
        assert!(root.path().join("7/CT/2023-01-10/a.dcm").is_file());
        assert!(!root.path().join("7/CT/2023-01-10/b.dcm").exists());
        assert!(root
            .path()
            .join("duplicates/7/CT/2023-01-10/b.dcm")
            .is_file());

        // Quarantined files are outside the scan; a second run is a no-op
        let second = detect_duplicates(root.path(), opts, &source).unwrap();
        assert!(second.groups.is_empty());
        assert_eq!(second.resolved, 0);
    }

    #[test]
    fn test_delete_removes_redundant_members() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aa");
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"bbbb");
        write_file(root.path(), "7/CT/2023-01-10/c.dcm", b"cccccc");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"))
            .with_uid("c.dcm", Some("1.2.3"));

        let opts = DedupOptions {
            action: DuplicateAction::Delete,
            ..DedupOptions::default()
        };
        let report = detect_duplicates(root.path(), opts, &source).unwrap();

        assert_eq!(report.resolved, 2);
        assert!(root.path().join("7/CT/2023-01-10/a.dcm").is_file());
        assert!(!root.path().join("7/CT/2023-01-10/b.dcm").exists());
        assert!(!root.path().join("7/CT/2023-01-10/c.dcm").exists());
    }

    #[test]
    fn test_largest_size_policy() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aa");
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"bbbb");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"));

        let opts = DedupOptions {
            policy: CanonicalPolicy::LargestSize,
            ..DedupOptions::default()
        };
        let report = detect_duplicates(root.path(), opts, &source).unwrap();
        let canonical = report.groups[0]
            .members
            .iter()
            .find(|m| m.canonical)
            .unwrap();
        assert!(canonical.path.ends_with("b.dcm"));
    }

    #[test]
    fn test_size_tie_breaks_on_path() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"same");
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"same");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"));

        let report =
            detect_duplicates(root.path(), DedupOptions::default(), &source).unwrap();
        let canonical = report.groups[0]
            .members
            .iter()
            .find(|m| m.canonical)
            .unwrap();
        assert!(canonical.path.ends_with("a.dcm"));
    }

    #[test]
    fn test_ct_only_scope() {
        let root = TempDir::new().unwrap();
        write_file(root.path(), "7/CT/2023-01-10/a.dcm", b"aa");
        write_file(root.path(), "7/CT/2023-01-10/b.dcm", b"bbbb");
        write_file(root.path(), "7/RS/x.dcm", b"same bytes");
        write_file(root.path(), "7/RS/y.dcm", b"same bytes");
        let source = StubSource::new()
            .with_uid("a.dcm", Some("1.2.3"))
            .with_uid("b.dcm", Some("1.2.3"))
            .with_uid("x.dcm", Some("9.9.9"))
            .with_uid("y.dcm", Some("9.9.9"));

        let opts = DedupOptions {
            ct_only: true,
            ..DedupOptions::default()
        };
        let report = detect_duplicates(root.path(), opts, &source).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert_eq!(report.groups[0].bucket, ModalityBucket::CtPlanning);
    }

    #[test]
    fn test_unreadable_metadata_falls_back_to_hash() {
        let root = TempDir::new().unwrap();
        // No stub entries at all: identity comes from content hashing
        write_file(root.path(), "7/RD/a.dcm", b"identical payload");
        write_file(root.path(), "7/RD/b.dcm", b"identical payload");
        let source = StubSource::new();

        let report =
            detect_duplicates(root.path(), DedupOptions::default(), &source).unwrap();
        assert_eq!(report.groups.len(), 1);
        assert!(matches!(report.groups[0].key, IdentityKey::ContentHash(_)));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let source = StubSource::new();
        let err = detect_duplicates(
            Path::new("/nonexistent/organized"),
            DedupOptions::default(),
            &source,
        )
        .unwrap_err();
        assert!(matches!(err, RtsortError::Config(_)));
    }
}
