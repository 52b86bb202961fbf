use std::fmt;

/// Acquisition date of a record, or the unknown sentinel
///
/// Files without a parsable date are routed to a literal `unknown_date`
/// subdirectory rather than dropped. The derived ordering puts every known
/// date before `Unknown`, which makes "earliest CT date wins" fall out of a
/// plain `min()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "json", derive(serde::Serialize))]
pub enum AcquisitionDate {
    Known { year: u16, month: u8, day: u8 },
    Unknown,
}

/// Directory name used for records without a date
pub const UNKNOWN_DATE_DIR: &str = "unknown_date";

impl AcquisitionDate {
    /// Parses a DICOM `YYYYMMDD` date value
    ///
    /// Anything absent or unparsable becomes [`AcquisitionDate::Unknown`].
    pub fn from_dicom(raw: Option<&str>) -> Self {
        let Some(raw) = raw else {
            return AcquisitionDate::Unknown;
        };
        let raw = raw.trim();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return AcquisitionDate::Unknown;
        }
        let year: u16 = raw[0..4].parse().unwrap_or(0);
        let month: u8 = raw[4..6].parse().unwrap_or(0);
        let day: u8 = raw[6..8].parse().unwrap_or(0);
        if year == 0 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
            return AcquisitionDate::Unknown;
        }
        AcquisitionDate::Known { year, month, day }
    }

    /// Parses an organized-tree directory name (`YYYY-MM-DD` or
    /// `unknown_date`) back into a date
    pub fn from_dir_name(name: &str) -> Option<Self> {
        if name == UNKNOWN_DATE_DIR {
            return Some(AcquisitionDate::Unknown);
        }
        let bytes = name.as_bytes();
        if !name.is_ascii() || bytes.len() != 10 || bytes[4] != b'-' || bytes[7] != b'-' {
            return None;
        }
        let compact = format!("{}{}{}", &name[0..4], &name[5..7], &name[8..10]);
        match AcquisitionDate::from_dicom(Some(&compact)) {
            AcquisitionDate::Unknown => None,
            known => Some(known),
        }
    }

    /// Directory name for this date in the organized tree
    pub fn dir_name(&self) -> String {
        self.to_string()
    }

    /// Whether this is the unknown sentinel
    pub fn is_unknown(&self) -> bool {
        matches!(self, AcquisitionDate::Unknown)
    }
}

impl fmt::Display for AcquisitionDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionDate::Known { year, month, day } => {
                write!(f, "{:04}-{:02}-{:02}", year, month, day)
            }
            AcquisitionDate::Unknown => write!(f, "{}", UNKNOWN_DATE_DIR),
        }
    }
}
