//! ICY/Shoutcast HTTP front end
//!
//! Accepts plain HTTP connections, answers with the ICY response headers and
//! hands each connection's write half to the broadcast engine.

pub mod config;
pub mod http;
pub mod listener;

pub use config::{ServerConfig, StationConfig};
pub use http::RequestHead;
pub use listener::RadioServer;
