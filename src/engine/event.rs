//! Engine notifications
//!
//! Advisory events for displays and logs. Delivered through a
//! `tokio::sync::broadcast` channel; a lagging observer misses events but
//! never slows the playback loop.

use std::sync::Arc;

use crate::catalog::Track;
use crate::error::Error;
use crate::listener::ListenerId;

/// Events emitted by the broadcast engine
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A track began streaming
    TrackStarted(Track),

    /// A track reached the end of its frames
    TrackFinished(Track),

    /// A listener was registered and replayed the catch-up window
    ListenerConnected(ListenerId),

    /// A listener was removed (explicitly or after a failed write)
    ListenerDisconnected(ListenerId),

    /// The playback loop died; emitted once per failure
    Fatal(Arc<Error>),
}
