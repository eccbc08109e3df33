//! `[serve]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"     # Network interface (127.0.0.1 = localhost only)
//! port = 3030                 # HTTP and WebSocket port
//! autostart = true            # Start serving as soon as the host is up
//! ```
//!
//! Use `interface = "0.0.0.0"` when the browser source runs on another machine.

use std::net::{IpAddr, Ipv4Addr};

use serde::{Deserialize, Serialize};

/// Broadcast server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    /// Network interface to bind.
    pub interface: IpAddr,

    /// Port used by `start` when none is given.
    pub port: u16,

    /// Start the server at launch instead of waiting for `start`.
    pub autostart: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3030,
            autostart: true,
        }
    }
}

impl ServeConfig {
    pub(in crate::config) fn validate(&self) -> Result<(), String> {
        if self.port == 0 {
            return Err("[serve] port must be non-zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    use crate::config::test_parse_config;

    #[test]
    fn test_serve_config() {
        let config =
            test_parse_config("[serve]\ninterface = \"0.0.0.0\"\nport = 8080\nautostart = false");

        assert_eq!(config.serve.interface, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(config.serve.port, 8080);
        assert!(!config.serve.autostart);
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = test_parse_config("");

        assert_eq!(config.serve.interface, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.serve.port, 3030);
        assert!(config.serve.autostart);
    }

    #[test]
    fn test_serve_config_ipv6() {
        let config = test_parse_config("[serve]\ninterface = \"::1\"");
        assert_eq!(config.serve.interface, IpAddr::V6(Ipv6Addr::LOCALHOST));
    }

    #[test]
    fn test_serve_config_rejects_port_zero() {
        let config = test_parse_config("[serve]\nport = 0");
        assert!(config.serve.validate().is_err());
    }
}
