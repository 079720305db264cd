//! Controllers for the CRD mirror
//!
//! The mirror controller discovers the public resource types and runs one
//! synchronizer per type, and also drives the one-shot copy and delete
//! operations.

mod mirror;

pub use mirror::MirrorController;
