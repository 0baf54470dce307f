//! Data Transfer Objects for REST request/response serialization.
//!
//! Timestamps are RFC 3339 strings in UTC.

pub mod common_dto;
pub mod history_dto;
pub mod page_dto;

pub use common_dto::*;
pub use history_dto::*;
pub use page_dto::*;
