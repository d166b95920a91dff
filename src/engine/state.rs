//! Shared broadcast state
//!
//! Current metadata, the live listener set and the catch-up history form one
//! consistency unit: every mutation happens under the engine's single lock.

use std::collections::HashMap;

use bytes::Bytes;

use crate::catalog::Track;
use crate::listener::{ListenerId, ListenerSink};
use crate::media::frame::concat_frames;
use crate::media::{Frame, IcyMetadata};
use crate::ring::RingBuffer;

/// Playback phase of the current track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackPhase {
    /// No track has been started yet
    Idle,
    /// Track opened, no frame read yet
    Starting,
    /// At least one frame read
    Streaming,
    /// Frame source exhausted
    Finished,
}

pub(super) struct BroadcastState {
    pub current_track: Option<Track>,
    pub phase: TrackPhase,
    pub metadata: IcyMetadata,
    pub listeners: HashMap<ListenerId, ListenerSink>,
    pub history: RingBuffer<Frame>,
}

impl BroadcastState {
    pub fn new(history_frames: usize) -> Self {
        Self {
            current_track: None,
            phase: TrackPhase::Idle,
            metadata: IcyMetadata::empty(),
            listeners: HashMap::new(),
            history: RingBuffer::new(history_frames),
        }
    }

    /// Switch to `track` and hand its metadata to every live listener
    pub fn start_track(&mut self, track: &Track) {
        self.metadata = IcyMetadata::new(&*track.name, &*track.category);
        self.current_track = Some(track.clone());
        self.phase = TrackPhase::Starting;

        for sink in self.listeners.values() {
            sink.update_metadata(self.metadata.clone());
        }
    }

    /// Bytes replayed to a newly joined listener
    pub fn catchup(&self) -> Bytes {
        concat_frames(self.history.iter())
    }

    /// Register `sink` after priming it with metadata and the catch-up window
    ///
    /// Returns false if it was already registered.
    pub fn attach(&mut self, sink: ListenerSink) -> bool {
        if self.listeners.contains_key(&sink.id()) {
            return false;
        }

        sink.update_metadata(self.metadata.clone());
        let catchup = self.catchup();
        if !catchup.is_empty() {
            sink.send(&catchup);
        }

        self.listeners.insert(sink.id(), sink);
        true
    }

    pub fn detach(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    /// Close and remove every listener, returning their ids
    pub fn close_all(&mut self) -> Vec<ListenerId> {
        self.listeners
            .drain()
            .map(|(id, sink)| {
                sink.close();
                id
            })
            .collect()
    }

    /// Record `frames` in history and send them to every live listener
    ///
    /// Listeners found not listening are removed; their ids are returned.
    pub fn broadcast(&mut self, frames: &[Frame]) -> Vec<ListenerId> {
        self.history.add_all(frames.iter().cloned());

        let data = concat_frames(frames);
        let mut dropped = Vec::new();

        self.listeners.retain(|id, sink| {
            if sink.is_listening() {
                sink.send(&data);
                true
            } else {
                dropped.push(*id);
                false
            }
        });

        dropped
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    fn frame(byte: u8) -> Frame {
        Frame::new(Bytes::from(vec![byte; 3]), Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_attach_replays_history() {
        let mut state = BroadcastState::new(2);
        state.broadcast(&[frame(1), frame(2), frame(3)]);

        let (client, mut server) = tokio::io::duplex(1024);
        let sink = ListenerSink::new(client, false);
        assert!(state.attach(sink.clone()));
        assert!(!state.attach(sink));

        let mut buf = [0u8; 6];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [2, 2, 2, 3, 3, 3]);
    }

    #[tokio::test]
    async fn test_start_track_updates_metadata() {
        let mut state = BroadcastState::new(4);
        let (client, _server) = tokio::io::duplex(1024);
        state.attach(ListenerSink::new(client, true));

        let track = Track::new("id", "Song", "Cat");
        state.start_track(&track);

        assert_eq!(state.metadata, IcyMetadata::new("Song", "Cat"));
        assert_eq!(state.phase, TrackPhase::Starting);
        assert_eq!(state.current_track.as_ref(), Some(&track));
    }

    #[tokio::test]
    async fn test_close_all_closes_connections() {
        let mut state = BroadcastState::new(4);
        let (client, mut server) = tokio::io::duplex(1024);
        let sink = ListenerSink::new(client, false);
        let id = sink.id();
        state.attach(sink.clone());

        assert_eq!(state.close_all(), vec![id]);
        assert!(state.listeners.is_empty());
        assert!(!sink.is_listening());

        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_drops_dead_listeners() {
        let mut state = BroadcastState::new(4);
        let writer = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();
        let sink = ListenerSink::new(writer, false);
        let id = sink.id();
        state.attach(sink.clone());

        assert!(state.broadcast(&[frame(1)]).is_empty());
        while sink.is_listening() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(state.broadcast(&[frame(2)]), vec![id]);
        assert!(state.listeners.is_empty());
        assert_eq!(state.history.len(), 2);
    }
}
