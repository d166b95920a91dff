//! Track catalog contract
//!
//! The catalog is where tracks come from. The engine only ever asks it to
//! refresh, list its tracks, and open one track as a [`FrameSource`].

pub mod fs;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::media::FrameSource;

pub use fs::DirectoryCatalog;

/// A playable track
///
/// Immutable; a catalog refresh produces a fresh list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Track {
    /// Catalog-unique identity (a file path for [`DirectoryCatalog`])
    pub id: Arc<str>,
    /// Display name
    pub name: Arc<str>,
    /// Category/group, announced as the stream url
    pub category: Arc<str>,
}

impl Track {
    pub fn new(
        id: impl Into<Arc<str>>,
        name: impl Into<Arc<str>>,
        category: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.category)
    }
}

/// Source of tracks for the playlist
pub trait TrackCatalog: Send + 'static {
    /// Re-scan the underlying store
    fn refresh(&mut self) -> Result<()>;

    /// Tracks found by the last refresh
    fn tracks(&self) -> Vec<Track>;

    /// Open a fresh frame source for `track`
    ///
    /// Errors mean "skip this track"; they are never fatal to the broadcast.
    fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>>;
}

impl<C: TrackCatalog + ?Sized> TrackCatalog for Box<C> {
    fn refresh(&mut self) -> Result<()> {
        (**self).refresh()
    }

    fn tracks(&self) -> Vec<Track> {
        (**self).tracks()
    }

    fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>> {
        (**self).open(track)
    }
}
