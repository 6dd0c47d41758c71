//! Data Transfer Objects for REST request/response serialization.

pub mod append_dto;

pub use append_dto::*;
