//! # KeelDB Configuration Module
//!
//! Centralizes the configuration constants for the storage core. Constants
//! are grouped by functional area and their interdependencies are documented
//! and enforced through compile-time assertions in [`constants`].
//!
//! Import constants from this module rather than redefining them locally:
//!
//! ```ignore
//! use keeldb::config::{PAGE_SIZE, PAGE_FRAME_HEADER_SIZE};
//! ```

pub mod constants;

pub use constants::*;
