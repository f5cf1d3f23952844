//! Shared test utilities for pdfmill integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated instance directory and task store
//! - Builders and fake collaborators for driving the orchestrator

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
