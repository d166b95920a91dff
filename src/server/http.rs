//! Minimal HTTP/1.x request head parsing and ICY response headers
//!
//! Listeners only ever issue a GET and then read forever, so the server
//! reads the request head, ignores any body, and answers with an
//! HTTP/1.0 200 followed by the audio stream.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::media::METADATA_INTERVAL;

use super::config::ServerConfig;

/// Largest accepted request head
pub const MAX_HEAD_LEN: usize = 8 * 1024;

const HEAD_END: &[u8] = b"\r\n\r\n";

/// Parsed request line and headers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl RequestHead {
    /// Parse a head terminated by an empty line
    pub fn parse(head: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(head)
            .map_err(|_| Error::Http("request head is not valid UTF-8".into()))?;
        let mut lines = text.split("\r\n");

        let request_line = lines.next().unwrap_or_default();
        let mut parts = request_line.split_whitespace();
        let (Some(method), Some(path), Some(version)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Http(format!("malformed request line: {:?}", request_line)));
        };
        if !version.starts_with("HTTP/") {
            return Err(Error::Http(format!("unsupported protocol: {}", version)));
        }

        let mut headers = Vec::new();
        for line in lines {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(Error::Http(format!("malformed header: {:?}", line)));
            };
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }

        Ok(Self {
            method: method.to_string(),
            path: path.to_string(),
            headers,
        })
    }

    /// First value of header `name`, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Client asked for interleaved metadata (`Icy-MetaData: 1`)
    pub fn wants_metadata(&self) -> bool {
        self.header("Icy-MetaData").is_some_and(|v| v == "1")
    }
}

/// Read bytes until the blank line ending the request head
///
/// Bytes following the head in the same read are discarded.
pub async fn read_request_head<R>(reader: &mut R) -> Result<RequestHead>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);

    loop {
        if let Some(end) = find_head_end(&buf) {
            return RequestHead::parse(&buf[..end + HEAD_END.len()]);
        }
        if buf.len() >= MAX_HEAD_LEN {
            return Err(Error::Http("request head too large".into()));
        }

        let n = reader.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::Http("connection closed before request head".into()));
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEAD_END.len()).position(|w| w == HEAD_END)
}

/// Response head for a listener connection
///
/// `host` is the request's Host header, advertised as `icy-url` when no
/// station url is configured.
pub fn response_head(config: &ServerConfig, with_metadata: bool, host: Option<&str>) -> String {
    let url = config.url.as_deref().or(host).unwrap_or_default();

    let mut head = String::with_capacity(256);
    head.push_str("HTTP/1.0 200 OK\r\n");
    head.push_str("Content-Type: audio/mpeg\r\n");
    head.push_str("Cache-Control: no-cache\r\n");
    head.push_str("Pragma: no-cache\r\n");
    push_header(&mut head, "icy-br", &config.bitrate.to_string());
    push_header(&mut head, "icy-genre", &config.genre);
    push_header(&mut head, "icy-name", &config.name);
    head.push_str("icy-pub: 0\r\n");
    push_header(&mut head, "icy-url", url);
    if with_metadata {
        push_header(&mut head, "icy-metaint", &METADATA_INTERVAL.to_string());
    }
    head.push_str("\r\n");
    head
}

/// Error response sent before closing a rejected connection
pub fn error_head(status: u16, reason: &str) -> String {
    format!(
        "HTTP/1.0 {} {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        status, reason
    )
}

fn push_header(head: &mut String, name: &str, value: &str) {
    head.push_str(name);
    head.push_str(": ");
    // Header values must not break the head apart
    head.extend(value.chars().filter(|c| *c != '\r' && *c != '\n'));
    head.push_str("\r\n");
}
