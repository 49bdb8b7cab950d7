//! Data models shared across the engine.

pub mod param;
pub mod value;

pub use param::{Parameter, normalize_params};
pub use value::{Value, ValueKind};
