//! Pipeline sequencing for shipline.
//!
//! Runs the stages of a resolved pipeline one after another, feeding each
//! stage the artifact of the previous one, and stops at the first failure.
//! The container-backed stage implementations live in [`stages`].

pub mod job;
pub mod sequencer;
pub mod stages;
pub mod workspace;

#[cfg(test)]
pub(crate) mod testing;

pub use sequencer::{Capabilities, PipelineResult, PipelineSequencer, StageState};
