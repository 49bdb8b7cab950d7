//! Datamapper Library
//!
//! A database-agnostic persistence engine: application code persists and
//! retrieves plain business objects while query execution is delegated to a
//! pluggable [`driver::Driver`]. Entity types declare their table mapping
//! through [`registry::Entity`]; the [`engine::PersistenceEngine`] turns
//! those mappings into cached SQL statements and parameter sets, and the
//! [`transaction::TransactionCoordinator`] lets nested operations share one
//! ambient transaction with a single owner.

pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod mapping;
pub mod models;
pub mod registry;
pub mod relation;
pub mod transaction;

pub use config::{DriverOptions, UuidEncoding};
pub use engine::PersistenceEngine;
pub use error::{EngineError, EngineResult};
pub use registry::{DescriptorRegistry, Entity};
pub use relation::ChildLoader;
pub use transaction::{TransactionContext, TransactionCoordinator};
