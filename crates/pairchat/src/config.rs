//! pairchat client configuration

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};

/// pairchat - end-to-end encrypted two-party chat client
#[derive(Parser, Debug, Clone)]
#[command(name = "pairchat")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// TCP port of the relay on localhost
    pub port: u16,
}

impl Config {
    /// Relay address
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_argument() {
        let config = Config::try_parse_from(["pairchat", "4000"]).unwrap();
        assert_eq!(config.addr().port(), 4000);
        assert!(config.addr().ip().is_loopback());
    }

    #[test]
    fn test_missing_port_is_usage_error() {
        let err = Config::try_parse_from(["pairchat"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }
}
