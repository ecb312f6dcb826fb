//! examgate-store: In-memory ports and configuration.
//!
//! Implements the `Store`, `RelationshipStore` and `PrincipalResolver`
//! traits from `examgate-core` over process memory, plus fault-injecting
//! wrappers for tests and the TOML configuration loader.

pub mod config;
pub mod memory;
pub mod mock;
pub mod relationships;
pub mod resolver;

pub use config::{create_service, load_config, load_config_from, ExamgateConfig};
pub use memory::MemoryStore;
pub use relationships::StaticRelationships;
pub use resolver::TokenResolver;
