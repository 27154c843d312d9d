//! Core domain types and traits for the shipline CI pipeline.
//!
//! This crate contains:
//! - Resource identifiers and the shared error type
//! - Executor and image store traits for container backends
//! - Pipeline definitions, stage descriptors and run events
//! - Stage capability traits (build, package, publish, sign, scan)
//! - Secret records and the secret set handed to the pipeline
//! - Image references and tag policies

pub mod error;
pub mod executor;
pub mod id;
pub mod image;
pub mod pipeline;
pub mod secret;
pub mod stage;
pub mod tag;

pub use error::{Error, Result};
pub use id::ResourceId;
