//! # Glint IPC
//!
//! Envelope types for the channel between the host process and its display
//! processes: JSON-RPC-like requests and responses for the call half
//! (subscribe, store updates, capture commands) and push event frames for
//! the store channel. The concrete transport is someone else's problem:
//! anything that delivers these frames reliably and in order will do.

mod protocol;

pub use protocol::{
    error_codes, ErrorInfo, Event, EventKind, Method, Request, Response, STORE_CHANNEL,
};
