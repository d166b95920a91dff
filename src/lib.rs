//! Live ICY/Shoutcast audio broadcaster
//!
//! One playback timeline is read once, paced to wall-clock time, and fanned
//! out to any number of HTTP listeners. Listeners that ask for it receive
//! "now playing" metadata blocks interleaved into the audio stream.
//!
//! # Architecture
//!
//! ```text
//!   TrackCatalog ──► Playlist ──(lookahead thread)──┐
//!                                                   ▼
//!                                     BroadcastEngine (playback thread)
//!                                     ┌─────────────────────────────┐
//!                                     │ Mutex<BroadcastState> {     │
//!                                     │   metadata,                 │
//!                                     │   listeners,                │
//!                                     │   history: RingBuffer,      │
//!                                     │ }                           │
//!                                     └──────────────┬──────────────┘
//!                        ┌───────────────────────────┼──────────────┐
//!                        ▼                           ▼              ▼
//!                  ListenerSink                ListenerSink   ListenerSink
//!                  (tokio write task)               ...            ...
//!                        │
//!                        └──► TCP
//! ```

mod backoff;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod listener;
pub mod media;
pub mod playlist;
pub mod ring;
pub mod server;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

pub use catalog::{DirectoryCatalog, Track, TrackCatalog};
pub use engine::{BroadcastEngine, EngineConfig, RadioEvent, RestartPolicy};
pub use error::{Error, Result};
pub use listener::{ListenerId, ListenerSink};
pub use media::{Frame, FrameSource, IcyMetadata};
pub use playlist::Playlist;
pub use ring::RingBuffer;
pub use server::{RadioServer, ServerConfig, StationConfig};
pub use status::StationMonitor;
