use clap::Parser;
use log::{error, LevelFilter};
use rtsort_core::cli::report::{TextDedup, TextStats, TextSummary, TextViolations};
use rtsort_core::cli::{placement_mode, Cli, Command, FormatArg};
use rtsort_core::{
    analyze_tree, detect_duplicates, organize, verify, DedupOptions, DicomExtractor,
    OrganizeOptions, Result,
};
use std::process;

fn main() {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => process::exit(code),
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}

fn setup_logging(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
}

/// Runs one subcommand and returns the process exit code
///
/// 0 for a clean run, 2 for a run that completed with findings (skipped
/// files, duplicates, violations); fatal errors propagate and exit 1.
fn run(command: Command) -> Result<i32> {
    match command {
        Command::Organize {
            input_dir,
            output,
            link,
            workers,
        } => {
            let opts = OrganizeOptions {
                mode: placement_mode(link),
                workers,
            };
            let report = organize(&input_dir, &output, opts, &DicomExtractor)?;
            print!("{}", TextSummary(&report));
            Ok(if report.has_warnings() { 2 } else { 0 })
        }

        Command::DetectDuplicates {
            organized_dir,
            action,
            ct_only,
            policy,
            format,
        } => {
            let opts = DedupOptions {
                action: action.into(),
                ct_only,
                policy: policy.into(),
            };
            let report = detect_duplicates(&organized_dir, opts, &DicomExtractor)?;
            match format {
                FormatArg::Text => print!("{}", TextDedup(&report)),
                #[cfg(feature = "json")]
                FormatArg::Json => {
                    let json = serde_json::to_string_pretty(&report).map_err(|e| {
                        std::io::Error::new(std::io::ErrorKind::InvalidData, e)
                    })?;
                    println!("{}", json);
                }
            }
            Ok(if report.has_duplicates() || !report.skipped.is_empty() {
                2
            } else {
                0
            })
        }

        Command::Verify {
            organized_dir,
            input,
        } => {
            let violations = verify(&organized_dir, input.as_deref())?;
            print!("{}", TextViolations(&violations));
            Ok(if violations.is_empty() { 0 } else { 2 })
        }

        Command::CrossValidate { organized_dir } => {
            let report = analyze_tree(&organized_dir, &DicomExtractor)?;
            print!("{}", TextStats(&report));
            Ok(if report.outliers.is_empty() && report.errors.is_empty() {
                0
            } else {
                2
            })
        }
    }
}
