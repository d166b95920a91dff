//! Encoded audio frames
//!
//! The broadcaster never looks inside a frame. It only needs the raw bytes
//! to forward and the playback time the frame represents, which drives the
//! pacing loop.

use std::time::Duration;

use bytes::{Bytes, BytesMut};

use crate::error::Result;

/// One self-contained unit of encoded audio
///
/// Cheap to clone: the payload is reference counted, so the catch-up buffer
/// and every listener share one allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Encoded payload, forwarded to listeners verbatim
    pub data: Bytes,
    /// Wall-clock time this frame lasts when played
    pub duration: Duration,
}

impl Frame {
    pub fn new(data: Bytes, duration: Duration) -> Self {
        Self { data, duration }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Concatenate the payloads of `frames` into one buffer
pub fn concat_frames<'a, I>(frames: I) -> Bytes
where
    I: IntoIterator<Item = &'a Frame>,
    I::IntoIter: Clone,
{
    let iter = frames.into_iter();
    let total: usize = iter.clone().map(Frame::len).sum();
    let mut buf = BytesMut::with_capacity(total);
    for frame in iter {
        buf.extend_from_slice(&frame.data);
    }
    buf.freeze()
}

/// A lazy, finite sequence of frames for one track
///
/// Sources are not restartable; the catalog opens a fresh one per play.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the track is exhausted
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }
}
