//! HTTP API for onair-bc
//!
//! Control page and command endpoint, the audio stream, status and SSE.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, AppContext};
