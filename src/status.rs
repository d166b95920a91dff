//! Station status tracking
//!
//! [`StationMonitor`] follows the engine's event stream and keeps what an
//! operator display needs: the track on air, recently finished tracks, the
//! most recent errors and the listener count.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tokio::task::JoinHandle;

use crate::catalog::Track;
use crate::engine::RadioEvent;
use crate::ring::RingBuffer;

/// Entries kept in the song and error histories
pub const HISTORY_SIZE: usize = 10;

struct MonitorState {
    current: Option<Track>,
    listeners: usize,
    songs: RingBuffer<Track>,
    errors: RingBuffer<String>,
}

/// Point-in-time view of the station
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationStatus {
    pub current: Option<Track>,
    pub listeners: usize,
    /// Finished tracks, newest first
    pub songs: Vec<Track>,
    /// Error messages, newest first
    pub errors: Vec<String>,
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Listeners: {}", self.listeners)?;
        match &self.current {
            Some(track) => writeln!(f, "Now playing: {}", track)?,
            None => writeln!(f, "Now playing: nothing")?,
        }

        writeln!(f, "History:")?;
        if self.songs.is_empty() {
            writeln!(f, "  empty")?;
        }
        for (i, track) in self.songs.iter().enumerate() {
            writeln!(f, "  {} -> {}", i + 1, track)?;
        }

        writeln!(f, "Errors:")?;
        if self.errors.is_empty() {
            writeln!(f, "  empty")?;
        }
        for (i, error) in self.errors.iter().enumerate() {
            writeln!(f, "  {} -> {}", i + 1, error)?;
        }
        Ok(())
    }
}

/// Event-driven station status
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct StationMonitor {
    state: Arc<Mutex<MonitorState>>,
}

impl StationMonitor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MonitorState {
                current: None,
                listeners: 0,
                songs: RingBuffer::new(HISTORY_SIZE),
                errors: RingBuffer::new(HISTORY_SIZE),
            })),
        }
    }

    /// Apply one engine event
    pub fn handle(&self, event: &RadioEvent) {
        let mut state = self.lock();
        match event {
            RadioEvent::TrackStarted(track) => {
                state.current = Some(track.clone());
            }
            RadioEvent::TrackFinished(track) => {
                state.songs.add(track.clone());
            }
            RadioEvent::ListenerConnected(_) => {
                state.listeners += 1;
            }
            RadioEvent::ListenerDisconnected(_) => {
                state.listeners = state.listeners.saturating_sub(1);
            }
            RadioEvent::Fatal(error) => {
                state.errors.add(error.to_string());
            }
        }
    }

    /// Follow `events` on the current runtime until the engine goes away
    pub fn spawn(&self, mut events: Receiver<RadioEvent>) -> JoinHandle<()> {
        let monitor = self.clone();

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        monitor.handle(&event);
                        tracing::debug!(event = ?event, "Station event");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Station monitor lagged behind events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    pub fn current_track(&self) -> Option<Track> {
        self.lock().current.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners
    }

    /// Copy of everything tracked
    pub fn status(&self) -> StationStatus {
        let state = self.lock();
        StationStatus {
            current: state.current.clone(),
            listeners: state.listeners,
            songs: state.songs.iter().rev().cloned().collect(),
            errors: state.errors.iter().rev().cloned().collect(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for StationMonitor {
    fn default() -> Self {
        Self::new()
    }
}
