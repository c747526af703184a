//! API request handlers.

pub mod dam;
pub mod status;
