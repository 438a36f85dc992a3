//! # Glint records
//!
//! The typed record model shared by the host process and every display
//! process. A record is an immutable, uniquely-identified unit of
//! application state: once created it is only ever replaced wholesale under
//! the same ID, never mutated in place.
//!
//! ## Non-negotiable Principles
//!
//! - **Records are plain data** - serde-serializable fields only, no live
//!   handles, no cycles
//! - **IDs are type-prefixed** - a bare ID routes to its type without lookups
//! - **The schema is fixed at startup** - host and follower registries must
//!   be identical; replication depends on it
//! - **Singletons are IDs, not queries** - at-most-one-instance is enforced
//!   by ID collision

mod id;
mod schema;
mod types;

pub use id::{BrowserWindowId, ChildWindowId, DisplayId, RecordId};
pub use schema::{Schema, SchemaBuilder, SchemaInfo, SchemaViolation, Validator};
pub use types::{
    Bounds, CaptureActivityRecord, CaptureMode, DisplayRecord, EditorRecord, PreferencesRecord,
    Record, RecordType, WindowRecord,
};
