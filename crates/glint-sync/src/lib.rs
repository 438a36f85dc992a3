//! # Glint sync
//!
//! Replication between the host's authoritative store and the replica store
//! in each display process.
//!
//! ## Non-negotiable Principles
//!
//! - **One snapshot, then diffs** - a new subscriber gets exactly one `Init`
//!   frame with the full store; everything after is incremental `Changes`
//! - **Only local diffs travel** - each side forwards diffs tagged `Local`
//!   and applies everything incoming as `Remote`; that single rule is what
//!   prevents replication loops
//! - **Protocol errors are session-fatal** - a malformed frame fails the
//!   subscription, never half-applies
//! - **A dead channel is a disconnect, not an error** - the follower process
//!   is assumed to be terminating
//!
//! ## Message flow
//!
//! ```text
//! follower UI ── put ──▶ replica store ── Local diff ──▶ store.update ──▶ host
//! host ── applies Remote ──▶ authoritative store ──▶ Changes ──▶ other followers
//! host UI ── put ──▶ authoritative store ── Local diff ──▶ Changes ──▶ all followers
//! ```

mod client;
mod error;
mod event;
mod publisher;

pub use client::StoreClient;
pub use error::{SyncError, SyncResult};
pub use event::StoreEvent;
pub use publisher::{StorePublisher, SubscriberId};
