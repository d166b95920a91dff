//! Per-connection listener output
//!
//! A [`ListenerSink`] turns broadcast batches into bytes on one listener's
//! connection:
//!
//! ```text
//!   send(batch) ──► MetadataInterleaver ──► pending queue ──► write task ──► socket
//!                   (ICY listeners only)     (≤ 5 batches)     (≤ 1 in flight)
//! ```
//!
//! The producer never waits on a listener. A listener that falls more than
//! [`MAX_QUEUED_BATCHES`] batches behind has its write cancelled and stops
//! listening; the engine drops it on the next broadcast pass.

pub mod interleave;
pub mod sink;

pub use interleave::MetadataInterleaver;
pub use sink::{ListenerId, ListenerSink, MAX_QUEUED_BATCHES};
