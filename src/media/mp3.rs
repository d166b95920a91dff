//! MPEG audio frame splitting
//!
//! Splits an MPEG-1/2/2.5 Layer I/II/III file into its frames without
//! decoding anything. Each frame header gives the frame's byte length and
//! sample count, which is all the pacing loop needs.
//!
//! Frame header (32 bits):
//! ```text
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//! A: sync (all ones)   B: version   C: layer   D: no CRC
//! E: bitrate index     F: sample rate index    G: padding
//! ```

use std::time::Duration;

use bytes::Bytes;

use crate::error::{MediaError, Result};

use super::frame::{Frame, FrameSource};

const HEADER_LEN: usize = 4;
const ID3V2_HEADER_LEN: usize = 10;

/// Bitrates in kbps, indexed by the 4-bit bitrate field
const BITRATES_V1_L1: [u32; 15] = [
    0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448,
];
const BITRATES_V1_L2: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384,
];
const BITRATES_V1_L3: [u32; 15] = [
    0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320,
];
const BITRATES_V2_L1: [u32; 15] = [
    0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256,
];
const BITRATES_V2_L23: [u32; 15] = [
    0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160,
];

/// MPEG audio version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

/// Parsed MPEG audio frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3FrameHeader {
    pub version: MpegVersion,
    /// Layer number, 1 to 3
    pub layer: u8,
    /// Bitrate in kbps
    pub bitrate: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub padding: bool,
}

impl Mp3FrameHeader {
    /// Parse the 4 header bytes at the start of `data`
    pub fn parse(data: &[u8]) -> std::result::Result<Self, MediaError> {
        if data.len() < HEADER_LEN || data[0] != 0xFF || data[1] & 0xE0 != 0xE0 {
            return Err(MediaError::InvalidFrameHeader);
        }

        let version = match (data[1] >> 3) & 0x03 {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return Err(MediaError::InvalidFrameHeader),
        };

        let layer = match (data[1] >> 1) & 0x03 {
            1 => 3,
            2 => 2,
            3 => 1,
            _ => return Err(MediaError::InvalidFrameHeader),
        };

        // Free-format (0) and bad (15) bitrates cannot be framed without decoding
        let bitrate_index = (data[2] >> 4) as usize;
        if bitrate_index == 0 || bitrate_index == 15 {
            return Err(MediaError::InvalidFrameHeader);
        }
        let table = match (version, layer) {
            (MpegVersion::Mpeg1, 1) => &BITRATES_V1_L1,
            (MpegVersion::Mpeg1, 2) => &BITRATES_V1_L2,
            (MpegVersion::Mpeg1, _) => &BITRATES_V1_L3,
            (_, 1) => &BITRATES_V2_L1,
            _ => &BITRATES_V2_L23,
        };
        let bitrate = table[bitrate_index];

        let base_rate = match (data[2] >> 2) & 0x03 {
            0 => 44100,
            1 => 48000,
            2 => 32000,
            _ => return Err(MediaError::InvalidFrameHeader),
        };
        let sample_rate = match version {
            MpegVersion::Mpeg1 => base_rate,
            MpegVersion::Mpeg2 => base_rate / 2,
            MpegVersion::Mpeg25 => base_rate / 4,
        };

        Ok(Self {
            version,
            layer,
            bitrate,
            sample_rate,
            padding: (data[2] >> 1) & 0x01 == 1,
        })
    }

    /// PCM samples per channel carried by one frame
    pub fn samples_per_frame(&self) -> u32 {
        match (self.layer, self.version) {
            (1, _) => 384,
            (2, _) | (3, MpegVersion::Mpeg1) => 1152,
            _ => 576,
        }
    }

    /// Total frame length in bytes, header included
    pub fn frame_len(&self) -> usize {
        let bps = self.bitrate * 1000;
        if self.layer == 1 {
            ((12 * bps / self.sample_rate + self.padding as u32) * 4) as usize
        } else {
            (self.samples_per_frame() / 8 * bps / self.sample_rate + self.padding as u32) as usize
        }
    }

    /// Playback time of one frame
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(
            self.samples_per_frame() as u64 * 1_000_000_000 / self.sample_rate as u64,
        )
    }
}

/// Frame source over an in-memory MPEG audio file
pub struct Mp3FrameReader {
    data: Bytes,
    pos: usize,
}

impl Mp3FrameReader {
    /// Wrap a whole file; a leading ID3v2 tag is skipped
    pub fn new(data: Bytes) -> Self {
        let pos = id3v2_len(&data);
        Self { data, pos }
    }

    /// Byte offset of the next unread frame
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Locate and validate the frame at `offset`
    fn frame_at(&self, offset: usize) -> std::result::Result<Mp3FrameHeader, MediaError> {
        let header = Mp3FrameHeader::parse(&self.data[offset..])?;
        let expected = header.frame_len();
        let available = self.data.len() - offset;
        if expected > available {
            return Err(MediaError::TruncatedFrame {
                expected,
                available,
            });
        }
        Ok(header)
    }
}

impl FrameSource for Mp3FrameReader {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        while self.data.len() - self.pos >= HEADER_LEN {
            match self.frame_at(self.pos) {
                Ok(header) => {
                    let len = header.frame_len();
                    let data = self.data.slice(self.pos..self.pos + len);
                    self.pos += len;
                    return Ok(Some(Frame::new(data, header.duration())));
                }
                Err(MediaError::TruncatedFrame {
                    expected,
                    available,
                }) => {
                    tracing::debug!(expected, available, "Dropping truncated trailing frame");
                    break;
                }
                // Not a frame boundary (ID3v1 tag, junk): resync byte by byte
                Err(_) => self.pos += 1,
            }
        }

        self.pos = self.data.len();
        Ok(None)
    }
}

/// Length of a leading ID3v2 tag, or 0
fn id3v2_len(data: &[u8]) -> usize {
    if data.len() < ID3V2_HEADER_LEN || &data[..3] != b"ID3" {
        return 0;
    }

    // Sizes are synchsafe: 7 significant bits per byte
    let size = data[6..10]
        .iter()
        .fold(0usize, |acc, &b| (acc << 7) | (b & 0x7F) as usize);
    let footer = if data[5] & 0x10 != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };

    (ID3V2_HEADER_LEN + size + footer).min(data.len())
}
