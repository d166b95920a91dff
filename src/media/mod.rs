//! Media handling for the broadcaster
//!
//! This module provides:
//! - Encoded audio frames and the frame source contract
//! - ICY "now playing" metadata blocks
//! - MPEG audio frame splitting (no decoding)

pub mod frame;
pub mod icy;
pub mod mp3;

pub use frame::{Frame, FrameSource};
pub use icy::{IcyMetadata, METADATA_INTERVAL};
pub use mp3::{Mp3FrameHeader, Mp3FrameReader};
