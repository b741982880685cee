//! Stage execution engine: invocation parsing, transform resolution,
//! workspace cleanup, and the controller that ties them to the ledger and
//! manifest table.

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod ledgers;
pub mod resolve;
pub mod transform;
pub mod workspace;

pub use context::{derive_component, ContextError, InvocationContext};
pub use controller::{Outcome, StageController, StageControllerBuilder};
pub use error::{CompensationError, FailureKind, PreconditionError, StageError};
pub use ledgers::LedgerRegistry;
pub use transform::{
    ResolveError, Transform, TransformFactory, TransformRegistry, TransformRequest,
    TransformResolver,
};
pub use workspace::{CleanupError, CleanupReport, FsCleaner, Workspace, WorkspaceCleaner};
