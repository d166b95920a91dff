//! ICY "now playing" metadata blocks
//!
//! Block layout on the wire:
//! ```text
//! +--------+----------------------------------------+-----------+
//! | N (u8) | StreamTitle='<title>';StreamUrl='<url>'; | 0x00 pad  |
//! +--------+----------------------------------------+-----------+
//!            \____________ 16 * N bytes in total _______________/
//! ```
//!
//! `N = ceil(payload_len / 16)`. A block with `N = 0` is a single zero byte
//! meaning "no metadata".

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::MediaError;

/// Bytes of audio between two metadata blocks (advertised as `icy-metaint`)
pub const METADATA_INTERVAL: usize = 16384;

/// Payload granularity of a metadata block
const BLOCK_UNIT: usize = 16;

/// Largest payload a single length byte can describe
const MAX_PAYLOAD: usize = u8::MAX as usize * BLOCK_UNIT;

/// Serialized metadata block for the current track
///
/// Built once per track change and shared read-only by every listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IcyMetadata {
    title: String,
    url: String,
    raw: Bytes,
}

impl IcyMetadata {
    /// Build a block announcing `title` with `url` as the stream url field
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        let title = title.into();
        let url = url.into();

        let text = format!("StreamTitle='{}';StreamUrl='{}';", title, url);
        let payload = truncate_at_char_boundary(&text, MAX_PAYLOAD).as_bytes();

        let units = payload.len().div_ceil(BLOCK_UNIT);
        let mut raw = BytesMut::with_capacity(1 + units * BLOCK_UNIT);
        raw.put_u8(units as u8);
        raw.put_slice(payload);
        raw.put_bytes(0, units * BLOCK_UNIT - payload.len());

        Self {
            title,
            url,
            raw: raw.freeze(),
        }
    }

    /// The "no metadata" block: a single zero length byte
    pub fn empty() -> Self {
        Self {
            title: String::new(),
            url: String::new(),
            raw: Bytes::from_static(&[0]),
        }
    }

    /// Parse a block produced by [`IcyMetadata::new`] or any ICY server
    pub fn parse(block: &[u8]) -> Result<Self, MediaError> {
        let (&units, rest) = block
            .split_first()
            .ok_or(MediaError::InvalidMetadataBlock)?;
        let len = units as usize * BLOCK_UNIT;
        if rest.len() != len {
            return Err(MediaError::InvalidMetadataBlock);
        }

        let end = rest.iter().position(|&b| b == 0).unwrap_or(len);
        let text = String::from_utf8_lossy(&rest[..end]);

        Ok(Self {
            title: extract_field(&text, "StreamTitle").unwrap_or_default(),
            url: extract_field(&text, "StreamUrl").unwrap_or_default(),
            raw: Bytes::copy_from_slice(block),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wire bytes, length byte included
    pub fn as_bytes(&self) -> &Bytes {
        &self.raw
    }

    /// Total wire length, `1 + 16 * N`
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// True for the single-byte "no metadata" block
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 1
    }
}

impl Default for IcyMetadata {
    fn default() -> Self {
        Self::empty()
    }
}

fn truncate_at_char_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Extract `Key='value';` from a metadata payload
fn extract_field(text: &str, key: &str) -> Option<String> {
    let marker = format!("{}='", key);
    let start = text.find(&marker)? + marker.len();
    let rest = &text[start..];
    let end = rest.find("';").unwrap_or(rest.len());
    Some(rest[..end].to_string())
}
