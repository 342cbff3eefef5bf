//! Shared test utilities for pdfmask integration tests.
//!
//! This module provides:
//! - `ScriptedService`, an in-memory processing service with per-file behavior
//! - `TestSession`, a running driver wired to the scripted service, an
//!   in-memory progress channel and an in-memory output sink
//! - Builders for scripting service behavior and fast test configs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
