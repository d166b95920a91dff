//! Test doubles shared by unit tests

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::catalog::{Track, TrackCatalog};
use crate::error::{Error, Result};
use crate::media::{Frame, FrameSource};

/// Frame layout for a stub track
#[derive(Debug, Clone, Copy)]
pub struct TrackShape {
    pub frames: u32,
    pub frame_duration: Duration,
    pub frame_len: usize,
    /// Fail with a source error after this many frames
    pub fail_after: Option<u32>,
}

impl TrackShape {
    pub fn new(frames: u32, frame_duration: Duration) -> Self {
        Self {
            frames,
            frame_duration,
            frame_len: 8,
            fail_after: None,
        }
    }
}

/// Frames carry `[track tag, frame index (u32 be), filler...]`
pub struct SyntheticSource {
    tag: u8,
    shape: TrackShape,
    next: u32,
}

impl SyntheticSource {
    pub fn new(tag: u8, shape: TrackShape) -> Self {
        Self {
            tag,
            shape,
            next: 0,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.shape.fail_after == Some(self.next) {
            return Err(Error::Source {
                track: format!("tag {}", self.tag),
                message: "synthetic read failure".into(),
            });
        }
        if self.next >= self.shape.frames {
            return Ok(None);
        }

        let mut data = vec![self.tag; self.shape.frame_len.max(5)];
        data[1..5].copy_from_slice(&self.next.to_be_bytes());
        self.next += 1;

        Ok(Some(Frame::new(Bytes::from(data), self.shape.frame_duration)))
    }
}

#[derive(Default)]
struct StubState {
    tracks: Vec<(Track, TrackShape)>,
    broken: HashSet<String>,
    empty_refreshes: u32,
}

/// In-memory catalog with scriptable failures
#[derive(Clone, Default)]
pub struct StubCatalog {
    state: Arc<Mutex<StubState>>,
    pub refreshes: Arc<AtomicU32>,
    pub opens: Arc<Mutex<HashMap<String, u32>>>,
}

impl StubCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_track(self, id: &str, shape: TrackShape) -> Self {
        let track = Track::new(id, id, "Stub");
        self.state.lock().unwrap().tracks.push((track, shape));
        self
    }

    /// Names of `n` one-frame tracks, "t0".."tn"
    pub fn with_tracks(mut self, n: usize) -> Self {
        for i in 0..n {
            self = self.with_track(&format!("t{}", i), TrackShape::new(1, Duration::ZERO));
        }
        self
    }

    pub fn break_track(&self, id: &str) {
        self.state.lock().unwrap().broken.insert(id.to_string());
    }

    /// The next `n` refreshes report an empty catalog
    pub fn empty_for(&self, n: u32) {
        self.state.lock().unwrap().empty_refreshes = n;
    }

    pub fn open_count(&self, id: &str) -> u32 {
        self.opens.lock().unwrap().get(id).copied().unwrap_or(0)
    }
}

impl TrackCatalog for StubCatalog {
    fn refresh(&mut self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn tracks(&self) -> Vec<Track> {
        let mut state = self.state.lock().unwrap();
        if state.empty_refreshes > 0 {
            state.empty_refreshes -= 1;
            return Vec::new();
        }
        state.tracks.iter().map(|(t, _)| t.clone()).collect()
    }

    fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>> {
        *self.opens.lock().unwrap().entry(track.id.to_string()).or_default() += 1;

        let state = self.state.lock().unwrap();
        if state.broken.contains(&*track.id) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "broken stub track",
            )));
        }
        let (index, (_, shape)) = state
            .tracks
            .iter()
            .enumerate()
            .find(|(_, (t, _))| t.id == track.id)
            .ok_or_else(|| Error::Catalog(format!("unknown track {}", track.id)))?;

        Ok(Box::new(SyntheticSource::new(index as u8 + b'A', *shape)))
    }
}
