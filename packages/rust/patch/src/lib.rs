//! Patch-based editing protocol for generated blueprints.
//!
//! An edit request names a target section and carries free-form intent text.
//! The engine locates the section, asks a planner for a structured batch of
//! operations, validates the whole batch against a snapshot, and applies it
//! all-or-nothing.

mod engine;
mod ops;

pub use engine::{
    EditContext, PatchEngine, PatchOutcome, PatchPlanner, apply_batch, parse_batch,
    validate_batch,
};
pub use ops::{NewSection, PatchOperation};
