//! Configuration for pairchatd

use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};

/// pairchatd - two-party encrypted chat relay
#[derive(Parser, Debug, Clone)]
#[command(name = "pairchatd")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// TCP port to listen on (bound on localhost)
    pub port: u16,
}

impl Config {
    /// Listen address
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_positional_port() {
        let config = Config::try_parse_from(["pairchatd", "9000"]).unwrap();
        assert_eq!(config.addr(), "127.0.0.1:9000".parse().unwrap());
    }

    #[test]
    fn test_wrong_argument_count_is_usage_error() {
        assert!(Config::try_parse_from(["pairchatd"]).is_err());
        assert!(Config::try_parse_from(["pairchatd", "9000", "9001"]).is_err());
        assert!(Config::try_parse_from(["pairchatd", "not-a-port"]).is_err());
    }
}
