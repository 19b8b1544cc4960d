//! Stream session: configuration, events, lifecycle

pub mod config;
pub mod event;
pub mod stream;

pub use config::{SessionConfig, StreamFormat};
pub use event::{StreamEvent, VideoFrame};
pub use stream::{SessionState, StreamSession};
