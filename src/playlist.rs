//! Shuffled, repeat-avoiding playlist
//!
//! Yields an endless sequence of playable tracks drawn from a catalog:
//!
//! 1. When the current permutation is used up, refresh the catalog until it
//!    lists at least one track (with backoff), then shuffle it.
//! 2. If the new permutation would start with the track just played, swap
//!    that track into the back half so it is not heard twice in a row.
//! 3. Walk the permutation, opening each candidate. Tracks that fail to
//!    open are skipped; a pass with no openable track starts over.
//! 4. A candidate equal to the track just played is pushed further down the
//!    permutation while any other candidate remains, so a skipped track
//!    cannot bring it back to back.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::backoff::Backoff;
use crate::catalog::{Track, TrackCatalog};
use crate::media::FrameSource;

/// A track together with its freshly opened frame source
pub struct PlaylistEntry {
    pub track: Track,
    pub source: Box<dyn FrameSource>,
}

impl std::fmt::Debug for PlaylistEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylistEntry")
            .field("track", &self.track)
            .finish_non_exhaustive()
    }
}

/// Endless shuffled playlist over a [`TrackCatalog`]
///
/// Implements [`Iterator`]; `next()` blocks while the catalog is empty or
/// unplayable and only returns `None` once the stop flag is raised.
pub struct Playlist<C, R = StdRng> {
    catalog: C,
    rng: R,
    order: Vec<Track>,
    index: usize,
    last_played: Option<Arc<str>>,
    retry: Backoff,
    stop: Arc<AtomicBool>,
}

impl<C: TrackCatalog> Playlist<C, StdRng> {
    /// Create a playlist shuffled from OS entropy
    pub fn new(catalog: C) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }
}

impl<C: TrackCatalog, R: Rng> Playlist<C, R> {
    /// Create a playlist with a caller-supplied random source
    pub fn with_rng(catalog: C, rng: R) -> Self {
        Self {
            catalog,
            rng,
            order: Vec::new(),
            index: 0,
            last_played: None,
            retry: Backoff::new(Duration::from_millis(100), Duration::from_secs(5)),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Set the backoff used while the catalog has nothing playable
    pub fn retry_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.retry = Backoff::new(initial, max);
        self
    }

    /// Share a stop flag; raising it makes `next()` return `None`
    pub fn stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Id of the track most recently returned
    pub fn last_played(&self) -> Option<&str> {
        self.last_played.as_deref()
    }

    /// Refresh the catalog until it is non-empty, then reshuffle
    ///
    /// Returns false if stopped while waiting.
    fn rebuild(&mut self) -> bool {
        let mut failures = 0;
        let tracks = loop {
            match self.catalog.refresh() {
                Ok(()) => {
                    let tracks = self.catalog.tracks();
                    if !tracks.is_empty() {
                        break tracks;
                    }
                    tracing::warn!(attempt = failures + 1, "Catalog is empty, retrying");
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt = failures + 1, "Catalog refresh failed, retrying");
                }
            }

            failures += 1;
            if !self.retry.sleep(failures, &self.stop) {
                return false;
            }
        };

        self.shuffle(tracks);
        true
    }

    fn shuffle(&mut self, mut tracks: Vec<Track>) {
        tracks.shuffle(&mut self.rng);

        let len = tracks.len();
        if len > 1 && self.last_played.as_deref() == Some(&*tracks[0].id) {
            let dest = self.rng.gen_range(len / 2..len);
            tracks.swap(0, dest);
        }

        self.order = tracks;
        self.index = 0;
    }

    fn is_last_played(&self, index: usize) -> bool {
        self.last_played.as_deref() == Some(&*self.order[index].id)
    }
}

impl<C: TrackCatalog, R: Rng> Iterator for Playlist<C, R> {
    type Item = PlaylistEntry;

    fn next(&mut self) -> Option<PlaylistEntry> {
        let mut failed_passes = 0;

        loop {
            if self.index >= self.order.len() {
                if failed_passes > 0 {
                    tracing::warn!(
                        passes = failed_passes,
                        "No track in the catalog could be opened, retrying"
                    );
                    if !self.retry.sleep(failed_passes, &self.stop) {
                        return None;
                    }
                }
                if !self.rebuild() {
                    return None;
                }
            }

            while self.index < self.order.len() {
                if self.is_last_played(self.index) && self.index + 1 < self.order.len() {
                    let later = self.rng.gen_range(self.index + 1..self.order.len());
                    self.order.swap(self.index, later);
                    continue;
                }

                let track = self.order[self.index].clone();
                self.index += 1;

                match self.catalog.open(&track) {
                    Ok(source) => {
                        self.last_played = Some(Arc::clone(&track.id));
                        return Some(PlaylistEntry { track, source });
                    }
                    Err(e) => {
                        tracing::warn!(track = %track, error = %e, "Skipping unplayable track");
                    }
                }
            }

            failed_passes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;
    use std::time::Instant;

    use super::*;
    use crate::testing::StubCatalog;

    fn playlist(catalog: StubCatalog, seed: u64) -> Playlist<StubCatalog> {
        Playlist::with_rng(catalog, StdRng::seed_from_u64(seed))
            .retry_backoff(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn next_id(playlist: &mut Playlist<StubCatalog>) -> String {
        playlist.next().unwrap().track.id.to_string()
    }

    #[test]
    fn test_each_pass_plays_every_track_once() {
        let mut playlist = playlist(StubCatalog::new().with_tracks(5), 7);

        let pass: HashSet<String> = (0..5).map(|_| next_id(&mut playlist)).collect();
        assert_eq!(pass.len(), 5);
    }

    #[test]
    fn test_no_immediate_repeat_across_reshuffles() {
        for n in [2usize, 3, 4, 9] {
            for seed in 0..20 {
                let mut playlist = playlist(StubCatalog::new().with_tracks(n), seed);
                let mut previous = next_id(&mut playlist);
                for _ in 0..(n * 6) {
                    let current = next_id(&mut playlist);
                    assert_ne!(current, previous, "n = {}, seed = {}", n, seed);
                    previous = current;
                }
            }
        }
    }

    #[test]
    fn test_no_repeat_when_a_track_is_broken() {
        for seed in 0..200 {
            let catalog = StubCatalog::new().with_tracks(3);
            catalog.break_track("t2");
            let mut playlist = playlist(catalog, seed);

            let mut previous = next_id(&mut playlist);
            for _ in 0..30 {
                let current = next_id(&mut playlist);
                assert_ne!(current, previous, "seed = {}", seed);
                previous = current;
            }
        }
    }

    #[test]
    fn test_single_track_repeats() {
        let mut playlist = playlist(StubCatalog::new().with_tracks(1), 1);

        assert_eq!(next_id(&mut playlist), "t0");
        assert_eq!(next_id(&mut playlist), "t0");
    }

    #[test]
    fn test_skips_unopenable_tracks() {
        let catalog = StubCatalog::new().with_tracks(4);
        catalog.break_track("t1");
        catalog.break_track("t3");
        let mut playlist = playlist(catalog.clone(), 3);

        for _ in 0..10 {
            let id = next_id(&mut playlist);
            assert!(id == "t0" || id == "t2", "got {}", id);
        }
        assert!(catalog.open_count("t1") > 0);
        assert_eq!(playlist.last_played().map(|s| s.len()), Some(2));
    }

    #[test]
    fn test_waits_for_non_empty_catalog() {
        let catalog = StubCatalog::new().with_tracks(2);
        catalog.empty_for(3);
        let mut playlist = playlist(catalog.clone(), 11);

        assert!(playlist.next().is_some());
        assert_eq!(catalog.refreshes.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_stop_flag_ends_retry_loop() {
        let catalog = StubCatalog::new().with_tracks(1);
        catalog.break_track("t0");

        let stop = Arc::new(AtomicBool::new(false));
        let mut playlist = Playlist::with_rng(catalog, StdRng::seed_from_u64(0))
            .retry_backoff(Duration::from_millis(10), Duration::from_millis(10))
            .stop_flag(Arc::clone(&stop));

        let stopper = Arc::clone(&stop);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            stopper.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        assert!(playlist.next().is_none());
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
