pub mod metadata;
pub mod tags;

pub use metadata::{
    extract_from_object, patient_id_from_filename, DicomExtractor, DicomMetadata, MetadataSource,
};
pub use tags::*;
