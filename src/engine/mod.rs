//! Broadcast engine
//!
//! Owns the playback thread and fans one paced timeline out to every
//! registered listener.
//!
//! # Threads
//!
//! ```text
//!   radiocast-playlist            radiocast-playback
//!   ┌──────────────────┐  entry  ┌──────────────────────────────┐
//!   │ Playlist::next() │ ──────► │ read batch ─► broadcast ─►   │
//!   │ (opens next track│ (rendez-│ pace (sleep off lead) ─► ... │
//!   │  while current   │  vous)  └──────────────┬───────────────┘
//!   │  one plays)      │                        │ Mutex<BroadcastState>
//!   └──────────────────┘                        ▼
//!                                   ListenerSink::send() per listener
//! ```
//!
//! # Catch-up
//!
//! Every broadcast batch also goes into a fixed-size frame history. A new
//! listener is replayed that history, then joins the live feed, all under
//! the same lock a broadcast pass takes, so it neither misses nor repeats
//! a batch.

pub mod broadcast;
pub mod config;
pub mod event;
pub(crate) mod pacing;
mod priority;
pub mod state;

pub use broadcast::BroadcastEngine;
pub use config::{EngineConfig, RestartPolicy, DEFAULT_BATCH_FRAMES};
pub use event::RadioEvent;
pub use state::TrackPhase;
