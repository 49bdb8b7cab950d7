//! Driver configuration.
//!
//! Drivers differ in what their native parameter binding supports. The engine
//! normalizes values before handing them over, governed by flags configured
//! once per driver instance. Loading these flags from files or environment is
//! the host application's concern.

use serde::{Deserialize, Serialize};

/// How UUID values are encoded for the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidEncoding {
    /// 16-byte binary encoding.
    #[default]
    Binary,
    /// 32-character simple hex text, fixed length.
    Text,
}

/// Value-normalization flags for one driver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverOptions {
    /// Encode booleans as 0/1 integers (default: true; most engines lack a
    /// portable boolean type).
    pub booleans_as_integers: bool,
    /// UUID encoding (default: binary).
    pub uuid_encoding: UuidEncoding,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            booleans_as_integers: true,
            uuid_encoding: UuidEncoding::default(),
        }
    }
}
