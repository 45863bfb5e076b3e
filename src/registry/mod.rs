//! The dynamic endpoint registry.
//!
//! Route synthesis, dedup and installation, the live dispatch table, the
//! application lifecycle state machine and the request dispatch adapter.

pub mod dispatch;
pub mod install;
pub mod lifecycle;
pub mod synth;
pub mod table;

pub use dispatch::DispatchAdapter;
pub use install::EndpointInstaller;
pub use lifecycle::LifecycleController;
pub use synth::{synthesize, HandlerRef, RouteDef};
pub use table::{EndpointTable, MatchEntry};
