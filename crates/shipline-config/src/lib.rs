//! KDL configuration parsing for shipline.
//!
//! This crate handles:
//! - Pipeline definitions (shipline.kdl)
//! - Resolving a parsed pipeline against secrets, git and the clock
//! - Variable interpolation
//! - Reading the artifact id from a Maven project descriptor

pub mod error;
pub mod pipeline;
pub mod project;
pub mod resolve;
pub mod variables;

pub use error::{ConfigError, ConfigResult};
pub use pipeline::{PipelineConfig, StageConfig, ValueSource, load_pipeline, parse_pipeline};
pub use resolve::ResolveContext;
pub use variables::{GitContext, VariableContext, VariableContextBuilder};
