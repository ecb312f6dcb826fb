//! examgate-core: Access decisions and attempt lifecycle for assessments.
//!
//! This crate defines the data model, the storage and identity ports, the
//! decision engine, and the action handlers that sit behind any transport.
//! Concrete stores live in `examgate-store`.

pub mod attempt;
pub mod deadline;
pub mod error;
pub mod guard;
pub mod model;
pub mod policy;
pub mod replay;
pub mod results;
pub mod scenario;
pub mod service;
pub mod traits;
