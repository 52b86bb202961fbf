//! Human-readable rendering of run reports

use crate::crossval::StatsReport;
use crate::dedup::{DedupReport, IdentityKey};
use crate::organize::SummaryReport;
use crate::verify::Violation;
use std::fmt;

/// Text rendering of an organize summary
pub struct TextSummary<'a>(pub &'a SummaryReport);

impl fmt::Display for TextSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Organization summary")?;
        writeln!(f, "====================")?;
        for row in &report.rows {
            match row.date {
                Some(date) => writeln!(
                    f,
                    "  {} / {} / {}: {} files",
                    row.patient_id,
                    row.bucket.bucket_dir(),
                    date.dir_name(),
                    row.count
                )?,
                None => writeln!(
                    f,
                    "  {} / {}: {} files",
                    row.patient_id,
                    row.bucket.bucket_dir(),
                    row.count
                )?,
            }
        }
        writeln!(f)?;
        writeln!(f, "  placed:       {}", report.placed)?;
        writeln!(f, "  unclassified: {}", report.unclassified.len())?;
        writeln!(f, "  inferred:     {}", report.inferred)?;
        writeln!(f, "  demoted CT:   {}", report.demoted_ct)?;
        writeln!(f, "  skipped:      {}", report.skipped.len())?;
        writeln!(f, "  failures:     {}", report.failures.len())?;
        for (path, reason) in &report.skipped {
            writeln!(f, "  skipped {}: {}", path.display(), reason)?;
        }
        for (path, reason) in &report.failures {
            writeln!(f, "  failed {}: {}", path.display(), reason)?;
        }
        Ok(())
    }
}

/// Text rendering of a duplicate-detection report
pub struct TextDedup<'a>(pub &'a DedupReport);

impl fmt::Display for TextDedup<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(
            f,
            "Found {} duplicate groups ({} redundant files)",
            report.groups.len(),
            report.redundant_count()
        )?;
        for group in &report.groups {
            let scope = match &group.date {
                Some(date) => format!("{}/{}/{}", group.patient_id, group.bucket.bucket_dir(), date),
                None => format!("{}/{}", group.patient_id, group.bucket.bucket_dir()),
            };
            writeln!(f, "  [{}] {}", scope, describe_key(&group.key))?;
            for member in &group.members {
                let marker = if member.canonical { "keep" } else { "dup " };
                writeln!(
                    f,
                    "    {} {} ({} bytes)",
                    marker,
                    member.path.display(),
                    member.size_bytes
                )?;
            }
        }
        if report.resolved > 0 {
            writeln!(f, "  resolved: {}", report.resolved)?;
        }
        for (path, reason) in &report.skipped {
            writeln!(f, "  skipped {}: {}", path.display(), reason)?;
        }
        Ok(())
    }
}

fn describe_key(key: &IdentityKey) -> String {
    match key {
        IdentityKey::Uid(uid) => format!("uid {}", uid),
        IdentityKey::ContentHash(h) => format!("content hash {:016x}", h),
        IdentityKey::Fingerprint {
            size_bytes,
            rows,
            columns,
        } => format!("fingerprint {} bytes {}x{}", size_bytes, rows, columns),
    }
}

/// Text rendering of a statistics report
pub struct TextStats<'a>(pub &'a StatsReport);

impl fmt::Display for TextStats<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        writeln!(f, "Size statistics by patient and bucket")?;
        for s in &report.stats {
            let resolutions: Vec<&str> = s.resolutions.iter().map(|r| r.as_str()).collect();
            writeln!(
                f,
                "  {}/{}: {} files, {}..{} bytes, mean {:.0}, resolutions [{}]",
                s.patient_id,
                s.bucket_dir,
                s.file_count,
                s.min_size,
                s.max_size,
                s.mean_size,
                resolutions.join(", ")
            )?;
        }
        if !report.outliers.is_empty() {
            writeln!(f, "Size outliers (1.5 IQR)")?;
            for o in &report.outliers {
                writeln!(
                    f,
                    "  {} ({} bytes, expected {:.0}..{:.0})",
                    o.path.display(),
                    o.size_bytes,
                    o.lower_bound,
                    o.upper_bound
                )?;
            }
        }
        for (path, reason) in &report.errors {
            writeln!(f, "  error {}: {}", path.display(), reason)?;
        }
        Ok(())
    }
}

/// Text rendering of a violation list
pub struct TextViolations<'a>(pub &'a [Violation]);

impl fmt::Display for TextViolations<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return writeln!(f, "Verification passed: no violations");
        }
        writeln!(f, "Verification found {} violations", self.0.len())?;
        for violation in self.0 {
            writeln!(f, "  {}", violation)?;
        }
        Ok(())
    }
}
