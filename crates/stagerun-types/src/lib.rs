//! Shared stagerun identifier, status, event, and response types.
//!
//! Kept free of storage and runtime dependencies so the state and engine
//! crates can share them without circular dependencies.

pub mod event;
pub mod ids;
pub mod response;
pub mod state;
pub mod status;
