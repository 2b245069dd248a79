//! External audio tool integration: probing, mixing, and readable sources

pub mod mixer;
pub mod probe;
pub mod source;
pub mod tool;

pub use mixer::{MixRequest, MixSettings, MixedSource, Mixer};
pub use probe::BitrateProber;
pub use source::AudioSource;
pub use tool::{AudioTool, SoxTool, ToolProcess};
