//! ICY metadata interleaving
//!
//! Inserts the current metadata block after every `interval` bytes of audio,
//! regardless of how the audio is chunked by the producer.

use bytes::{BufMut, Bytes, BytesMut};

use crate::media::IcyMetadata;

/// Running metadata cadence for one listener
#[derive(Debug, Clone)]
pub struct MetadataInterleaver {
    interval: usize,
    /// Audio bytes left before the next block; always in `1..=interval`
    bytes_to_block: usize,
    metadata: IcyMetadata,
}

impl MetadataInterleaver {
    /// # Panics
    ///
    /// Panics if `interval` is zero.
    pub fn new(interval: usize) -> Self {
        assert!(interval > 0, "metadata interval must be non-zero");
        Self {
            interval,
            bytes_to_block: interval,
            metadata: IcyMetadata::empty(),
        }
    }

    /// Replace the block used from now on; already interleaved data is untouched
    pub fn set_metadata(&mut self, metadata: IcyMetadata) {
        self.metadata = metadata;
    }

    pub fn metadata(&self) -> &IcyMetadata {
        &self.metadata
    }

    pub fn bytes_to_block(&self) -> usize {
        self.bytes_to_block
    }

    /// Copy `audio` into a new buffer with metadata blocks spliced in
    pub fn interleave(&mut self, audio: &[u8]) -> Bytes {
        let blocks = (audio.len() + self.interval - self.bytes_to_block) / self.interval;
        let mut out = BytesMut::with_capacity(audio.len() + blocks * self.metadata.len());

        let mut rest = audio;
        while self.bytes_to_block <= rest.len() {
            let (head, tail) = rest.split_at(self.bytes_to_block);
            out.put_slice(head);
            out.put_slice(self.metadata.as_bytes());
            rest = tail;
            self.bytes_to_block = self.interval;
        }

        out.put_slice(rest);
        self.bytes_to_block -= rest.len();

        out.freeze()
    }
}
