//! Core orchestration for SiteForge website generation.
//!
//! This crate ties together context assembly, architecture planning, content
//! generation, and asset resolution into the checkpointed generation
//! pipeline, and hosts the trigger/worker-pool surface plus the
//! publish-adapter boundary.

pub mod llm;
pub mod orchestrator;
pub mod publish;
pub mod queue;
pub mod stages;
