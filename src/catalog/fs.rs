//! Directory-backed catalog
//!
//! Every `*.mp3` under the root is a track. The first directory below the
//! root names the track's category:
//!
//! ```text
//! music/
//!   rock/band/song.mp3   -> name "song", category "rock"
//!   loose.mp3            -> name "loose", category "loose.mp3"
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::media::{FrameSource, Mp3FrameReader};

use super::{Track, TrackCatalog};

const EXTENSION: &str = "mp3";

/// Catalog over a music directory
#[derive(Debug)]
pub struct DirectoryCatalog {
    root: PathBuf,
    tracks: Vec<Track>,
}

impl DirectoryCatalog {
    /// Create a catalog rooted at `root`; nothing is scanned until `refresh`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tracks: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn track_for(&self, path: &Path) -> Track {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let category = path
            .strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .unwrap_or_default();

        Track::new(path.to_string_lossy().into_owned(), name, category)
    }
}

impl TrackCatalog for DirectoryCatalog {
    fn refresh(&mut self) -> Result<()> {
        let mut files = Vec::new();
        collect_files(&self.root, &mut files)
            .map_err(|e| Error::Catalog(format!("{}: {}", self.root.display(), e)))?;
        files.sort();

        self.tracks = files.iter().map(|path| self.track_for(path)).collect();

        tracing::debug!(
            root = %self.root.display(),
            tracks = self.tracks.len(),
            "Catalog refreshed"
        );
        Ok(())
    }

    fn tracks(&self) -> Vec<Track> {
        self.tracks.clone()
    }

    fn open(&self, track: &Track) -> Result<Box<dyn FrameSource>> {
        let data = fs::read(&*track.id)?;
        Ok(Box::new(Mp3FrameReader::new(Bytes::from(data))))
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(EXTENSION))
        {
            out.push(path);
        }
    }
    Ok(())
}
