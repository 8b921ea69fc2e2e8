//! # Shelf Engine
//!
//! The synchronization core of the Shelf client: keeps a local record
//! store consistent with a remote authority under unreliable
//! connectivity, partial failures, and concurrent user actions.
//!
//! This crate provides three cooperating managers:
//! - [`PullEngine`] - fetches changed records in cursor-ordered pages
//!   and merges them into the local store, preserving client-owned
//!   fields
//! - [`DownloadOrchestrator`] - decides which records need content
//!   fetched, serializes transfers, and evicts stale local content
//! - [`UpdateQueue`] - durably records user mutations, delivers them to
//!   the server, and retries across restarts
//!
//! ## Architecture
//!
//! The managers share only the record store (atomic get/put) and the
//! session credential. Each guards its own re-entrancy with an explicit
//! run state; cancellation is cooperative, triggered solely by clearing
//! the credential, and aborted work never commits partial results.
//!
//! ## Key Invariants
//!
//! - The server is authoritative for its fields; the client is
//!   authoritative for download state and reading progress
//! - Pages are merged strictly in cursor order
//! - At most one content transfer is in flight at any instant
//! - A pending update is removed only on confirmed delivery or a
//!   definitive "resource gone" response

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod download;
mod error;
mod event;
mod http;
mod pull;
mod queue;
mod scheduler;
mod session;
mod state;
mod stats;
mod transport;

pub use client::{Command, SyncClient};
pub use config::SyncConfig;
pub use download::DownloadOrchestrator;
pub use error::{EngineError, EngineResult};
pub use event::{DownloadState, EngineEvent, EventBus};
pub use http::HttpTransport;
pub use pull::PullEngine;
pub use queue::UpdateQueue;
pub use scheduler::Scheduler;
pub use session::{CancelFlag, Session, SessionHandle};
pub use state::RunState;
pub use stats::{EngineStats, StatsSnapshot};
pub use transport::{MockTransport, RemoteTransport};
