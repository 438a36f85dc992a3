//! # Glint store
//!
//! The in-memory record store at the heart of the capture tool. One instance
//! lives in each process: the host holds the authoritative copy, every
//! display process holds a replica kept convergent by `glint-sync`.
//!
//! ## Non-negotiable Principles
//!
//! - **Mutations are atomic** - a batch applies entirely or not at all, and
//!   listeners observe exactly one diff per successful call
//! - **Every change is source-tagged** - `Local` for this process's own
//!   mutations, `Remote` for replicated ones; the tag is what keeps
//!   replication loop-free
//! - **Diffs compose** - applying diff A then diff B always equals applying
//!   `A.squash(B)`
//! - **Snapshots are for initial sync only** - never incremental updates

mod attachments;
mod diff;
mod error;
mod snapshot;
mod store;

pub use attachments::RecordAttachmentMap;
pub use diff::{RecordChange, RecordsDiff};
pub use error::{StoreError, StoreResult};
pub use snapshot::StoreSnapshot;
pub use store::{ChangeSource, ListenerId, Store};
