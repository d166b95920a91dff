//! Error types
//!
//! A single crate-wide error enum. Listener write failures never surface
//! here; they only flip the listener's `is_listening` flag.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while parsing media
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    /// Frame header bits describe a reserved/invalid value
    InvalidFrameHeader,
    /// Frame header claims more bytes than remain in the stream
    TruncatedFrame { expected: usize, available: usize },
    /// Metadata block length byte disagrees with the block size
    InvalidMetadataBlock,
}

impl fmt::Display for MediaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaError::InvalidFrameHeader => write!(f, "Invalid MPEG audio frame header"),
            MediaError::TruncatedFrame {
                expected,
                available,
            } => write!(
                f,
                "Truncated frame: expected {} bytes, {} available",
                expected, available
            ),
            MediaError::InvalidMetadataBlock => write!(f, "Invalid ICY metadata block"),
        }
    }
}

impl std::error::Error for MediaError {}

/// Error type for broadcaster operations
#[derive(Debug)]
pub enum Error {
    /// Underlying I/O failure
    Io(io::Error),
    /// The track catalog could not be refreshed
    Catalog(String),
    /// Reading frames from a track failed mid-stream
    Source { track: String, message: String },
    /// Media parsing failure
    Media(MediaError),
    /// Malformed or unsupported HTTP request
    Http(String),
    /// The playback loop was already started
    AlreadyRunning,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Catalog(msg) => write!(f, "Catalog error: {}", msg),
            Error::Source { track, message } => {
                write!(f, "Frame source error in {}: {}", track, message)
            }
            Error::Media(e) => write!(f, "Media error: {}", e),
            Error::Http(msg) => write!(f, "HTTP error: {}", msg),
            Error::AlreadyRunning => write!(f, "Broadcast engine already running"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Media(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<MediaError> for Error {
    fn from(e: MediaError) -> Self {
        Error::Media(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_source_error() {
        let err = Error::Source {
            track: "Song (Rock)".into(),
            message: "unexpected end".into(),
        };
        assert_eq!(
            err.to_string(),
            "Frame source error in Song (Rock): unexpected end"
        );
    }

    #[test]
    fn test_io_conversion_keeps_source() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_media_error_display() {
        let err = MediaError::TruncatedFrame {
            expected: 417,
            available: 12,
        };
        assert_eq!(
            err.to_string(),
            "Truncated frame: expected 417 bytes, 12 available"
        );
    }
}
