//! Command-line interface definitions

pub mod report;

use crate::dedup::DuplicateAction;
use crate::organize::PlacementMode;
use crate::types::CanonicalPolicy;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Radiotherapy DICOM organization toolkit
#[derive(Parser, Debug)]
#[command(name = "rtsort", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Organize a flat DICOM export into per-patient trees
    Organize {
        /// Directory holding the unorganized DICOM files
        input_dir: PathBuf,

        /// Root of the organized tree to build
        #[arg(short, long, default_value = "organized_dicom")]
        output: PathBuf,

        /// Symlink files instead of copying them
        ///
        /// The organized tree then depends on the input staying in place.
        #[arg(long)]
        link: bool,

        /// Number of worker threads
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
    },

    /// Find duplicate files within an organized tree
    DetectDuplicates {
        /// Root of the organized tree
        organized_dir: PathBuf,

        /// What to do with redundant copies
        #[arg(short, long, value_enum, default_value_t = ActionArg::Report)]
        action: ActionArg,

        /// Only scan planning CT directories
        #[arg(long)]
        ct_only: bool,

        /// Which copy of a group to keep
        #[arg(long, value_enum, default_value_t = PolicyArg::SmallestSize)]
        policy: PolicyArg,

        /// Report output format
        #[arg(short, long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },

    /// Check an organized tree against its structural invariants
    Verify {
        /// Root of the organized tree
        organized_dir: PathBuf,

        /// Original input directory, for completeness checking
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Report size and resolution statistics over an organized tree
    CrossValidate {
        /// Root of the organized tree
        organized_dir: PathBuf,
    },
}

/// Command-line duplicate action
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionArg {
    /// List duplicate groups, touch nothing
    Report,
    /// Move redundant copies under duplicates/
    Move,
    /// Delete redundant copies
    Delete,
}

impl From<ActionArg> for DuplicateAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Report => DuplicateAction::Report,
            ActionArg::Move => DuplicateAction::Move,
            ActionArg::Delete => DuplicateAction::Delete,
        }
    }
}

/// Command-line canonical-selection policy
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyArg {
    /// Keep the smallest copy
    SmallestSize,
    /// Keep the largest copy
    LargestSize,
}

impl From<PolicyArg> for CanonicalPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::SmallestSize => CanonicalPolicy::SmallestSize,
            PolicyArg::LargestSize => CanonicalPolicy::LargestSize,
        }
    }
}

/// Command-line report format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatArg {
    /// Human-readable text
    Text,
    /// JSON (requires the `json` build feature)
    #[cfg(feature = "json")]
    Json,
}

/// Placement mode from the `--link` flag
pub fn placement_mode(link: bool) -> PlacementMode {
    if link {
        PlacementMode::Link
    } else {
        PlacementMode::Copy
    }
}
