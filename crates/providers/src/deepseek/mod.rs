//! DeepSeek chat completions over `reqwest`.
//!
//! A streamed reply flows through [`splitter::EventSplitter`] (bytes to
//! frames), [`frame::Frame::classify`] (sentinel or payload) and
//! [`frame::decode_delta`] (payload to text), all driven by a
//! [`session::StreamSession`].

pub mod client;
pub mod config;
pub mod frame;
pub mod session;
pub mod splitter;
pub mod wire;

pub use client::DeepSeekClient;
pub use config::DeepSeekConfig;
