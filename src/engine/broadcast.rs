//! Broadcast engine implementation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast;

use crate::backoff::Backoff;
use crate::catalog::{Track, TrackCatalog};
use crate::error::{Error, Result};
use crate::listener::{ListenerId, ListenerSink};
use crate::media::{Frame, IcyMetadata};
use crate::playlist::{Playlist, PlaylistEntry};

use super::config::EngineConfig;
use super::event::RadioEvent;
use super::pacing::Pacer;
use super::priority;
use super::state::{BroadcastState, TrackPhase};

struct Shared {
    state: Mutex<BroadcastState>,
    events: broadcast::Sender<RadioEvent>,
    config: EngineConfig,
    stop: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// Single-source, multi-listener broadcaster
///
/// Cheap to clone; clones control the same broadcast.
#[derive(Clone)]
pub struct BroadcastEngine {
    shared: Arc<Shared>,
}

impl BroadcastEngine {
    /// Create an engine with default configuration
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Create an engine with custom configuration
    pub fn with_config(config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BroadcastState::new(config.history_frames)),
                events,
                config,
                stop: Arc::new(AtomicBool::new(false)),
                threads: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Receive engine events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.shared.events.subscribe()
    }

    /// Start broadcasting a shuffled playlist over `catalog`
    ///
    /// Returns immediately; playback runs on a dedicated thread.
    pub fn start<C: TrackCatalog>(&self, catalog: C) -> Result<()> {
        let config = &self.shared.config;
        let playlist = Playlist::new(catalog)
            .retry_backoff(config.catalog_retry_initial, config.catalog_retry_max);
        self.start_with_playlist(playlist)
    }

    /// Start broadcasting from a prepared playlist
    ///
    /// An engine that was shut down, or whose playback loop stopped for
    /// good, can be started again.
    pub fn start_with_playlist<C, R>(&self, playlist: Playlist<C, R>) -> Result<()>
    where
        C: TrackCatalog,
        R: Rng + Send + 'static,
    {
        let mut threads = lock(&self.shared.threads);
        if !threads.is_empty() && !self.is_stopped() {
            return Err(Error::AlreadyRunning);
        }
        // Threads of a stopped run exit promptly once the stop flag is up
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let playlist = playlist.stop_flag(Arc::clone(&self.shared.stop));
        // Capacity 0: the playlist thread prepares exactly one track ahead
        let (tx, rx) = mpsc::sync_channel::<PlaylistEntry>(0);

        let lookahead = thread::Builder::new()
            .name("radiocast-playlist".into())
            .spawn(move || {
                for entry in playlist {
                    if tx.send(entry).is_err() {
                        break;
                    }
                }
            })?;
        threads.push(lookahead);

        let engine = self.clone();
        let playback = thread::Builder::new()
            .name("radiocast-playback".into())
            .spawn(move || {
                priority::raise_current_thread();
                engine.supervise(rx);
            })?;
        threads.push(playback);

        tracing::info!(
            batch_frames = self.shared.config.batch_frames,
            history_frames = self.shared.config.history_frames,
            "Broadcast engine started"
        );
        Ok(())
    }

    /// Stop the playback loop and wait for its threads to exit
    ///
    /// Blocks for at most one stop-poll interval plus whatever catalog call
    /// is in progress.
    ///
    /// Every listener is disconnected.
    pub fn shutdown(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);

        let threads: Vec<_> = lock(&self.shared.threads).drain(..).collect();
        for handle in threads {
            let _ = handle.join();
        }
        // Covers an engine that was never started
        self.close_listeners();
        tracing::info!("Broadcast engine stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Register a listener: replay the catch-up window, then join the live feed
    ///
    /// Returns false if it was already registered. A stopped engine closes
    /// the sink instead of registering it and also returns false.
    pub fn add_listener(&self, sink: ListenerSink) -> bool {
        let id = sink.id();
        let (added, count) = {
            let mut state = lock(&self.shared.state);
            if self.is_stopped() {
                drop(state);
                tracing::debug!(listener = %id, "Broadcast stopped, listener refused");
                sink.close();
                return false;
            }
            let added = state.attach(sink);
            (added, state.listeners.len())
        };

        if added {
            tracing::info!(listener = %id, listeners = count, "Listener connected");
            self.emit(RadioEvent::ListenerConnected(id));
        }
        added
    }

    /// Remove a listener; removing an unknown id is a no-op
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let (removed, count) = {
            let mut state = lock(&self.shared.state);
            (state.detach(id), state.listeners.len())
        };

        if removed {
            tracing::info!(listener = %id, listeners = count, "Listener disconnected");
            self.emit(RadioEvent::ListenerDisconnected(id));
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.shared.state).listeners.len()
    }

    pub fn current_track(&self) -> Option<Track> {
        lock(&self.shared.state).current_track.clone()
    }

    pub fn current_metadata(&self) -> IcyMetadata {
        lock(&self.shared.state).metadata.clone()
    }

    pub fn phase(&self) -> TrackPhase {
        lock(&self.shared.state).phase
    }

    /// Frames currently held for catch-up, oldest first
    pub fn history(&self) -> Vec<Frame> {
        lock(&self.shared.state).history.snapshot()
    }

    /// Disconnect every listener
    fn close_listeners(&self) {
        let closed = lock(&self.shared.state).close_all();

        for id in closed {
            tracing::info!(listener = %id, "Listener closed, broadcast stopped");
            self.emit(RadioEvent::ListenerDisconnected(id));
        }
    }

    fn emit(&self, event: RadioEvent) {
        // No subscribers is fine
        let _ = self.shared.events.send(event);
    }

    /// Run the playback loop, restarting it per the configured policy
    fn supervise(&self, rx: Receiver<PlaylistEntry>) {
        let mut restarts = 0u32;

        loop {
            let error = match self.play(&rx) {
                Ok(()) => break,
                Err(e) => e,
            };

            tracing::error!(error = %error, restarts, "Playback loop failed");
            self.emit(RadioEvent::Fatal(Arc::new(error)));

            let Some(policy) = self.shared.config.restart else {
                break;
            };
            if policy.max_restarts.is_some_and(|max| restarts >= max) {
                tracing::error!(restarts, "Restart limit reached, broadcast stopped");
                break;
            }

            restarts += 1;
            let backoff = Backoff::new(policy.initial_backoff, policy.max_backoff);
            if !backoff.sleep(restarts, &self.shared.stop) {
                break;
            }
            tracing::info!(attempt = restarts, "Restarting playback loop");
        }

        // Listeners get a closed connection rather than a silent stream
        self.shared.stop.store(true, Ordering::SeqCst);
        self.close_listeners();
    }

    /// Play tracks until stopped or the playlist ends
    fn play(&self, rx: &Receiver<PlaylistEntry>) -> Result<()> {
        while !self.is_stopped() {
            let Ok(entry) = rx.recv() else {
                return Ok(());
            };
            self.play_track(entry)?;
        }
        Ok(())
    }

    fn play_track(&self, entry: PlaylistEntry) -> Result<()> {
        let PlaylistEntry { track, mut source } = entry;
        let batch_frames = self.shared.config.batch_frames;

        tracing::info!(track = %track, "Track started");
        self.emit(RadioEvent::TrackStarted(track.clone()));

        // Metadata reaches listeners before any frame of the track
        lock(&self.shared.state).start_track(&track);

        let mut pacer = Pacer::start();
        let mut batch: Vec<Frame> = Vec::with_capacity(batch_frames);
        let mut frames_sent = 0u64;

        loop {
            if self.is_stopped() {
                return Ok(());
            }

            let mut audio = Duration::ZERO;
            let mut exhausted = false;
            while batch.len() < batch_frames {
                let frame = source.next_frame().map_err(|e| match e {
                    Error::Source { .. } => e,
                    other => Error::Source {
                        track: track.to_string(),
                        message: other.to_string(),
                    },
                })?;
                match frame {
                    Some(frame) => {
                        if frames_sent == 0 && batch.is_empty() {
                            lock(&self.shared.state).phase = TrackPhase::Streaming;
                        }
                        audio += frame.duration;
                        batch.push(frame);
                    }
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }

            if batch.is_empty() {
                break;
            }

            frames_sent += batch.len() as u64;
            self.broadcast(&batch);
            batch.clear();

            pacer.pace(audio, &self.shared.stop);

            if exhausted {
                break;
            }
        }

        lock(&self.shared.state).phase = TrackPhase::Finished;
        tracing::info!(track = %track, frames = frames_sent, "Track finished");
        self.emit(RadioEvent::TrackFinished(track));
        Ok(())
    }

    /// One broadcast pass over history, live listeners and dead-listener cleanup
    pub(crate) fn broadcast(&self, frames: &[Frame]) {
        let (dropped, count) = {
            let mut state = lock(&self.shared.state);
            let dropped = state.broadcast(frames);
            (dropped, state.listeners.len())
        };

        for id in dropped {
            tracing::info!(listener = %id, listeners = count, "Listener dropped");
            self.emit(RadioEvent::ListenerDisconnected(id));
        }
    }
}

impl Default for BroadcastEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
