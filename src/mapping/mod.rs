//! Entity-to-table mapping: field maps, identity maps, statement caching,
//! and the descriptor that ties them together.

pub mod descriptor;
pub mod field;
pub mod identity;
pub mod statements;

pub use descriptor::{EntityDescriptor, Factory};
pub use field::{
    FieldKind, FieldMap, Getter, PersistFlags, ScopeMatch, Setter, UpdateScope, audit_timestamp,
};
pub use identity::{IdentityMap, KeyGetter, KeySetter, KeyStrategy};
pub use statements::{StatementCache, StatementKind};
