pub mod perception;
pub mod filter;
pub mod brain;
pub mod action;
pub mod pipeline;

pub use pipeline::{Pipeline, PipelineError, PipelineSettings, RunOutcome, RunReport};
