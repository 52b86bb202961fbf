//! Core type definitions for radiotherapy image organization
//!
//! This module provides the fundamental types used throughout the library:
//! - [`ModalityBucket`]: classification label (CT planning, CBCT, RS/RT/RD, ...)
//! - [`Confidence`]: how a classification was reached
//! - [`AcquisitionDate`]: calendar date or the `unknown_date` sentinel
//! - [`ImageRecord`]: one classified input file
//! - [`CanonicalPolicy`]: duplicate-resolution retention policy

mod date;
mod enums;
mod record;

pub use date::{AcquisitionDate, UNKNOWN_DATE_DIR};
pub use enums::{CanonicalPolicy, Confidence, ModalityBucket};
pub use record::ImageRecord;
