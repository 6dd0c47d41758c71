//! # fanride-backend
//!
//! Event-sourced backend for the FanRide live sports telemetry platform.
//!
//! One stream per live match aggregates scoreboard snapshots from an
//! external feed and per-rider trainer metrics, and fans the derived
//! state to subscribed clients over a persistent push hub.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP, WebSocket hub)          External feed
//!     │                                      │
//!     ├── REST handlers (api/)               └── IngestWorker (service/)
//!     ├── Hub connections (ws/)                      │
//!     │                                              ▼
//!     ├── ReadModelService (service/) ◄── EventStore (service/)
//!     │           ▲                              │ atomic batch
//!     ├── hub broadcast ◄───── Projector ◄── change feed
//!     │                        (service/)        │
//!     └──────────────── DocumentStore (store/) ──┘
//! ```
//!
//! The write path is one transactional batch per append: optimistic
//! guard on the snapshot, event creates, snapshot upsert, outbox
//! creates. The projector tails the change feed with durable leases and
//! materialises the three read models; all of its effects are
//! idempotent because delivery is at-least-once.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod store;
pub mod ws;
