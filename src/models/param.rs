//! The statement parameter model.
//!
//! Parameters carry a name, a value, a declared semantic kind, and a flag
//! requesting driver-side text substitution for drivers without full native
//! binding support. Normalization rewrites values into the encodings a driver
//! instance was configured for.

use serde::{Deserialize, Serialize};

use crate::config::{DriverOptions, UuidEncoding};
use crate::models::value::{Value, ValueKind};

/// One ordered statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    /// Placeholder name, without the `@` sigil.
    pub name: String,
    pub value: Value,
    /// Declared semantic type, inferred from the value at construction.
    pub kind: ValueKind,
    /// Request driver-side text substitution instead of native binding.
    /// Default: false
    #[serde(default)]
    pub inline_text: bool,
}

impl Parameter {
    /// Create a parameter, inferring its semantic kind from the value.
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        let kind = value.kind();
        Self {
            name: name.into(),
            value,
            kind,
            inline_text: false,
        }
    }

    /// Create a NULL parameter with an explicitly declared kind.
    pub fn null(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            value: Value::Null,
            kind,
            inline_text: false,
        }
    }

    /// Request text substitution for this parameter.
    pub fn with_inline_text(mut self) -> Self {
        self.inline_text = true;
        self
    }
}

/// Normalize parameters for a driver instance.
///
/// Booleans become the small-integer encoding and UUIDs become binary or
/// fixed-length simple text, governed by the driver's configuration flags.
/// The declared kind is preserved so drivers can still tell what the value
/// meant before normalization.
pub fn normalize_params(params: Vec<Parameter>, options: &DriverOptions) -> Vec<Parameter> {
    params
        .into_iter()
        .map(|mut param| {
            param.value = normalize_value(param.value, options);
            param
        })
        .collect()
}

fn normalize_value(value: Value, options: &DriverOptions) -> Value {
    match value {
        Value::Bool(v) if options.booleans_as_integers => Value::Int(i64::from(v)),
        Value::Uuid(v) => match options.uuid_encoding {
            UuidEncoding::Binary => Value::Bytes(v.as_bytes().to_vec()),
            UuidEncoding::Text => Value::Text(v.simple().to_string()),
        },
        other => other,
    }
}
