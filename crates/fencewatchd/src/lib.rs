//! fencewatch daemon - Geofence orchestration and observer broadcast server
//!
//! This crate provides the core infrastructure for the fencewatch daemon:
//! - `store` - Datastore seam and the in-memory store actor
//! - `observer` - Connected observers and the registry that tracks them
//! - `hub` - Encode-once fan-out to every observer
//! - `orchestrator` - Location report, geofence mutation and SOS workflows
//! - `server` - TCP server for client connections
//! - `config` - Daemon configuration
//!
//! # Architecture
//!
//! ```text
//!  clients ──▶ FenceServer ──▶ ConnectionHandler ──▶ Orchestrator ──▶ StoreActor
//!                  │                                      │
//!                  │ add/remove                           │ broadcast
//!                  ▼                                      ▼
//!           ObserverRegistry ◀─────── snapshot ─────── BroadcastHub
//!                  │
//!                  ▼
//!       per-client outbox ──▶ writer task ──▶ socket
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod hub;
pub mod observer;
pub mod orchestrator;
pub mod server;
pub mod store;
