//! Shared types for the kycwatch notification client and its dev server.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
