//! # OnAir Common Library
//!
//! Shared code for the OnAir radio services including:
//! - Error type and Result alias
//! - Configuration loading (CLI / environment / TOML / compiled defaults)
//! - Event types (RadioEvent enum)
//! - SSE stream helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::RadioEvent;
