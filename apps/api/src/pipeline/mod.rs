//! Generation pipeline: stage contract, orchestrator, and the coordinator
//! that manages concurrent runs.

pub mod context;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod orchestrator;
pub mod prompts;
pub mod stage;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;
