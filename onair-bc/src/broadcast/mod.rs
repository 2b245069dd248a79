//! Listener fan-out

pub mod registry;

pub use registry::{FanoutSink, ListenerRegistry, ListenerSink, ListenerStream};
