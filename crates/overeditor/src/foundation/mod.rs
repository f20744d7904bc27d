//! Foundation module - Core utilities and types
//!
//! - Math types and camera matrices
//! - Logging setup
//! - Accumulated status reports

pub mod logging;
pub mod math;
pub mod status;
