//! The annotation engine.
//!
//! This module provides:
//! - Annotation descriptors and their JSON wire form
//! - The PDF codec seam and its `lopdf` implementation
//! - Image source resolution
//! - Validation and drawing of annotation lists
//! - Fixed edit templates for the upload endpoints
//! - The edit session tying these together for one request

pub mod annotation;
pub mod applicator;
pub mod codec;
pub mod lopdf_codec;
pub mod resolver;
pub mod session;
pub mod template;

#[cfg(test)]
pub mod testing;

pub use annotation::WireAnnotation;
pub use lopdf_codec::LopdfCodec;
pub use resolver::AssetResolver;
pub use session::{EditOutput, EditPlan, EditSession, OutputEncoding};
pub use template::FixedTemplate;
