//! Custom resource definitions the mirror discovers and copies.
//!
//! - `descriptor`: what identifies a mirrorable type, and how a definition is
//!   rewritten into another group/version
//! - `client`: the definition store over the apiextensions API

mod client;
mod descriptor;

pub use client::{CrdClient, DefinitionStore};
pub use descriptor::{
    descriptors, rewrite_definition, serves, ResourceTypeDescriptor, LAST_APPLIED_ANNOTATION,
};
