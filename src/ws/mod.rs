//! Push hub: persistent bidirectional connections at `/hub/match`.
//!
//! Clients submit live trainer metrics and join stream groups; the
//! server fans derived-state changes (`matchState`, `tesHistory`,
//! `leaderboard`, `trainerEffect`) to group members and live `metrics`
//! to every other connection.

pub mod connection;
pub mod handler;
pub mod messages;
pub mod subscription;
