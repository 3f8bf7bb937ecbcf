//! Server configuration from command-line flags and environment variables.

use clap::Parser;
use csvhub_fetch::{FetcherConfig, DEFAULT_MAX_BODY_BYTES};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Default upload cap (64 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Parser, Debug, Clone)]
#[command(name = "csvhub-api")]
#[command(about = "CSV catalog and remote-join REST API", long_about = None)]
#[command(version)]
pub struct ServerConfig {
    /// Catalog location: a SQLite path, file://<path>, or memory://
    #[arg(long, env = "CSVHUB_CATALOG", default_value = "csvhub_catalog.db")]
    pub catalog: String,

    /// Address to bind
    #[arg(long, env = "CSVHUB_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,

    /// Port to listen on (falls back to PORT, then 8000)
    #[arg(long, env = "CSVHUB_PORT")]
    pub port: Option<u16>,

    /// Hard timeout for each remote API request, in seconds
    #[arg(long, env = "CSVHUB_FETCH_TIMEOUT_SECS", default_value_t = 10)]
    pub fetch_timeout_secs: u64,

    /// Largest remote API response accepted, in bytes
    #[arg(long, env = "CSVHUB_FETCH_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    pub fetch_max_body_bytes: usize,

    /// Largest upload request accepted, in bytes
    #[arg(long, env = "CSVHUB_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: usize,
}

impl ServerConfig {
    /// Socket address to bind, resolving the `PORT` fallback.
    pub fn socket_addr(&self) -> Result<SocketAddr, String> {
        let port = match self.port {
            Some(port) => port,
            None => match std::env::var("PORT") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u16>()
                    .map_err(|_| format!("PORT must be a valid port number, got '{}'", raw))?,
                Err(_) => DEFAULT_PORT,
            },
        };
        Ok(SocketAddr::new(self.bind, port))
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_body_bytes: self.fetch_max_body_bytes,
            ..FetcherConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let config = ServerConfig::try_parse_from([
            "csvhub-api",
            "--catalog",
            "memory://",
            "--port",
            "9001",
            "--fetch-timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(config.catalog, "memory://");
        assert_eq!(config.socket_addr().unwrap().port(), 9001);
        assert_eq!(config.fetcher_config().timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_bad_bind_address() {
        assert!(ServerConfig::try_parse_from(["csvhub-api", "--bind", "not-an-ip"]).is_err());
    }
}
