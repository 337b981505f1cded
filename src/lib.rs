//! Photo ingestion and annotation.
//!
//! An upload is stored, signed, captioned and categorized by remote inference
//! services, translated, and persisted together with its diary entry. The read
//! side assembles the annotated view of a photo.

pub mod assembler;
pub mod config;
pub mod db;
pub mod error;
pub mod inference;
pub mod logging;
pub mod pipeline;
pub mod storage;
pub mod translation;

#[cfg(test)]
mod test_support;

pub use assembler::{PhotoInformation, PhotoInformationAssembler};
pub use error::{AnnotationError, Result};
pub use pipeline::{AnnotationPipeline, PhotoUploadResult};
