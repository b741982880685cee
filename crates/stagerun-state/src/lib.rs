//! Execution ledger and manifest control table clients.
//!
//! Provides the [`ExecutionLedger`] and [`ManifestTable`] traits and
//! `SQLite` implementations of both. The stage controller only ever sees
//! the traits; hosts pick the implementation.

#![warn(clippy::pedantic)]

pub mod error;
pub mod ledger;
pub mod manifest;
pub mod prelude;
pub mod sqlite;

pub use error::StateError;
pub use ledger::ExecutionLedger;
pub use manifest::ManifestTable;
pub use sqlite::{SqliteLedger, SqliteManifestTable};
