//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Bitrate advertised in `icy-br`, in kbps
pub const DEFAULT_BITRATE: u32 = 96;

/// Default port when none is configured
pub const DEFAULT_PORT: u16 = 8000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Request head must arrive within this time
    pub request_timeout: Duration,

    /// Station name (`icy-name`)
    pub name: String,

    /// Station genre (`icy-genre`)
    pub genre: String,

    /// Station url (`icy-url`); the request's Host header when unset
    pub url: Option<String>,

    /// Stream bitrate in kbps (`icy-br`)
    pub bitrate: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            request_timeout: Duration::from_secs(10),
            name: "radiocast".into(),
            genre: "Various".into(),
            url: None,
            bitrate: DEFAULT_BITRATE,
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the request head timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set station name and genre
    pub fn station(mut self, name: impl Into<String>, genre: impl Into<String>) -> Self {
        self.name = name.into();
        self.genre = genre.into();
        self
    }

    /// Advertise a fixed station url
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set the advertised bitrate
    pub fn bitrate(mut self, kbps: u32) -> Self {
        self.bitrate = kbps;
        self
    }
}

/// Process-level station settings
///
/// Only the demo binary reads these from the environment; the library takes
/// explicit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub port: u16,
    pub music_path: PathBuf,
    pub name: String,
    pub genre: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            music_path: PathBuf::from("music"),
            name: "radiocast".into(),
            genre: "Various".into(),
        }
    }
}

impl StationConfig {
    /// Read `PORT`, `MUSIC_PATH`, `NAME` and `GENRE` from the environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Build from key/value pairs; unknown keys are ignored and missing or
    /// unparsable values keep their defaults
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.into();
            match key.as_ref() {
                "PORT" => match value.trim().parse() {
                    Ok(port) => config.port = port,
                    Err(_) => tracing::warn!(value = %value, "Ignoring invalid PORT"),
                },
                "MUSIC_PATH" => config.music_path = PathBuf::from(value),
                "NAME" => config.name = value,
                "GENRE" => config.genre = value,
                _ => {}
            }
        }

        config
    }

    /// Server configuration listening on all interfaces at `port`
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::with_addr(SocketAddr::from(([0, 0, 0, 0], self.port)))
            .station(self.name.clone(), self.genre.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.bitrate, 96);
        assert!(config.tcp_nodelay);
        assert!(config.url.is_none());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8001".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8001);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_connections(50)
            .request_timeout(Duration::from_secs(5))
            .station("Night Owl", "Jazz")
            .url("http://radio.example")
            .bitrate(128);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.name, "Night Owl");
        assert_eq!(config.genre, "Jazz");
        assert_eq!(config.url.as_deref(), Some("http://radio.example"));
        assert_eq!(config.bitrate, 128);
    }

    #[test]
    fn test_station_from_vars() {
        let config = StationConfig::from_vars([
            ("PORT", "8080"),
            ("MUSIC_PATH", "/srv/music"),
            ("NAME", "Night Owl"),
            ("GENRE", "Jazz"),
            ("HOME", "/root"),
        ]);

        assert_eq!(config.port, 8080);
        assert_eq!(config.music_path, PathBuf::from("/srv/music"));
        assert_eq!(config.name, "Night Owl");
        assert_eq!(config.genre, "Jazz");
    }

    #[test]
    fn test_station_invalid_port_keeps_default() {
        let config = StationConfig::from_vars([("PORT", "radio")]);

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.name, "radiocast");
    }

    #[test]
    fn test_station_server_config() {
        let station = StationConfig::from_vars([("PORT", "8123"), ("NAME", "X"), ("GENRE", "Y")]);
        let config = station.server_config();

        assert_eq!(config.bind_addr.port(), 8123);
        assert_eq!(config.name, "X");
        assert_eq!(config.genre, "Y");
    }
}
