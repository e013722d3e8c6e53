//! API route handlers.

pub mod kyc;
