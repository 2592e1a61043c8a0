//! Centralized configuration for Tidegate.
//!
//! All tunable parameters live here: gateway listen settings, engine options,
//! ingestion bounds, and the streamable-media allow-list. Supports environment
//! variable overrides for runtime customization.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Peer-listen port used when none is configured.
pub const DEFAULT_PEER_PORT: u16 = 42069;

/// Central configuration for all Tidegate components.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    pub engine: EngineConfig,
    pub ingest: IngestConfig,
    pub media: MediaConfig,
}

/// Streaming HTTP endpoint configuration.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Host name used when formatting stream links.
    pub host: String,
    /// Port the streaming endpoint listens on. Zero picks an ephemeral port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// Torrent engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Project name the storage directory is derived from.
    pub project_name: String,
    /// Explicit storage root, overriding the per-project cache directory.
    pub storage_dir: Option<PathBuf>,
    /// Peer-listen port; `None` falls back to [`DEFAULT_PEER_PORT`].
    pub peer_port: Option<u16>,
    /// Disables IPv6 networking when set.
    pub disable_ipv6: bool,
    /// Keep seeding completed torrents while the session is open.
    pub seed: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            project_name: "tidegate".to_string(),
            storage_dir: None,
            peer_port: None,
            disable_ipv6: false,
            seed: false,
        }
    }
}

/// Ingestion behavior configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Bound on metadata waits. `None` waits indefinitely.
    pub metadata_timeout: Option<Duration>,
    /// Total timeout for downloading a remote `.torrent` file.
    pub fetch_timeout: Duration,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            metadata_timeout: Some(Duration::from_secs(30)),
            fetch_timeout: Duration::from_secs(60),
        }
    }
}

/// Streamable media policy configuration.
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// File extensions (without the dot, case-sensitive) allowed for streaming.
    pub allowed_extensions: Vec<String>,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: [
                "mp4", "mkv", "avi", "av1", "mov", "flv", "f4v", "webm", "wmv", "mpeg", "mpg",
                "hevc", "flac",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
        }
    }
}

impl GatewayConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via `TIDEGATE_*` variables while
    /// maintaining the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("TIDEGATE_HTTP_HOST") {
            if !host.is_empty() {
                config.http.host = host;
            }
        }

        if let Ok(port) = std::env::var("TIDEGATE_HTTP_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.http.port = port;
            }
        }

        if let Ok(name) = std::env::var("TIDEGATE_PROJECT_NAME") {
            if !name.is_empty() {
                config.engine.project_name = name;
            }
        }

        if let Ok(dir) = std::env::var("TIDEGATE_STORAGE_DIR") {
            if !dir.is_empty() {
                config.engine.storage_dir = Some(PathBuf::from(dir));
            }
        }

        if let Ok(port) = std::env::var("TIDEGATE_PEER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                config.engine.peer_port = Some(port);
            }
        }

        if let Ok(disable) = std::env::var("TIDEGATE_DISABLE_IPV6") {
            config.engine.disable_ipv6 = disable.parse().unwrap_or(false);
        }

        if let Ok(seed) = std::env::var("TIDEGATE_SEED") {
            config.engine.seed = seed.parse().unwrap_or(false);
        }

        if let Ok(timeout) = std::env::var("TIDEGATE_METADATA_TIMEOUT") {
            if let Ok(seconds) = timeout.parse::<u64>() {
                // Zero disables the bound entirely.
                config.ingest.metadata_timeout = if seconds == 0 {
                    None
                } else {
                    Some(Duration::from_secs(seconds))
                };
            }
        }

        config
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Ephemeral HTTP port, temp-dir storage, and a short metadata bound so
    /// timeout paths finish quickly.
    pub fn for_testing() -> Self {
        Self {
            http: HttpConfig {
                host: "localhost".to_string(),
                port: 0,
            },
            engine: EngineConfig {
                project_name: "tidegate-test".to_string(),
                storage_dir: Some(std::env::temp_dir().join("tidegate-test")),
                peer_port: Some(0),
                disable_ipv6: false,
                seed: false,
            },
            ingest: IngestConfig {
                metadata_timeout: Some(Duration::from_millis(250)),
                fetch_timeout: Duration::from_secs(5),
            },
            media: MediaConfig::default(),
        }
    }

    /// Peer-listen port with the fixed default applied.
    pub fn peer_port(&self) -> u16 {
        self.engine.peer_port.unwrap_or(DEFAULT_PEER_PORT)
    }

    /// Socket address the streaming endpoint binds.
    ///
    /// Dual-stack wildcard normally; IPv4-only when IPv6 is disabled.
    pub fn listen_addr(&self) -> SocketAddr {
        let ip: IpAddr = if self.engine.disable_ipv6 {
            Ipv4Addr::UNSPECIFIED.into()
        } else {
            Ipv6Addr::UNSPECIFIED.into()
        };
        SocketAddr::new(ip, self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = GatewayConfig::default();

        assert_eq!(config.http.host, "localhost");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.engine.project_name, "tidegate");
        assert_eq!(config.engine.peer_port, None);
        assert_eq!(config.peer_port(), DEFAULT_PEER_PORT);
        assert!(!config.engine.disable_ipv6);
        assert!(!config.engine.seed);
        assert_eq!(config.ingest.metadata_timeout, Some(Duration::from_secs(30)));
        assert!(config.media.allowed_extensions.iter().any(|e| e == "mkv"));
    }

    #[test]
    fn test_listen_addr_respects_ipv6_toggle() {
        let mut config = GatewayConfig::default();
        assert!(config.listen_addr().is_ipv6());

        config.engine.disable_ipv6 = true;
        assert!(config.listen_addr().is_ipv4());
        assert_eq!(config.listen_addr().port(), 8080);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("TIDEGATE_HTTP_PORT", "9999");
            std::env::set_var("TIDEGATE_PROJECT_NAME", "customcast");
            std::env::set_var("TIDEGATE_PEER_PORT", "51413");
            std::env::set_var("TIDEGATE_DISABLE_IPV6", "true");
            std::env::set_var("TIDEGATE_METADATA_TIMEOUT", "0");
        }

        let config = GatewayConfig::from_env();

        assert_eq!(config.http.port, 9999);
        assert_eq!(config.engine.project_name, "customcast");
        assert_eq!(config.engine.peer_port, Some(51413));
        assert!(config.engine.disable_ipv6);
        assert_eq!(config.ingest.metadata_timeout, None);

        // Cleanup
        unsafe {
            std::env::remove_var("TIDEGATE_HTTP_PORT");
            std::env::remove_var("TIDEGATE_PROJECT_NAME");
            std::env::remove_var("TIDEGATE_PEER_PORT");
            std::env::remove_var("TIDEGATE_DISABLE_IPV6");
            std::env::remove_var("TIDEGATE_METADATA_TIMEOUT");
        }
    }
}
