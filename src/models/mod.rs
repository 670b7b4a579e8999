//! Core data models for the image store.
//!
//! Objects themselves live in the bucket; these modules hold the naming
//! conventions that tie images to their sidecar metadata and the analysis
//! record serialized into that sidecar.

pub mod analysis;
pub mod object;
