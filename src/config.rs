//! Command line configuration.
//!
//! ```text
//! callrelay -l tcp:0.0.0.0:8080
//! callrelay -l tls:0.0.0.0:443 --certfile cert.pem --keyfile key.pem --origin https://myserver
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;
use tracing::Level;

use crate::signaling::{AccessPolicy, DEFAULT_ICE_SERVER, PeerConnectionConfig};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid listen option {0:?}, expected TYPE:HOST:PORT")]
    InvalidListen(String),

    #[error("missing certfile or keyfile option for a TLS listener")]
    MissingTlsFiles,

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificate found in {}", .0.display())]
    EmptyCertChain(PathBuf),

    #[error("no private key found in {}", .0.display())]
    EmptyPrivateKey(PathBuf),

    #[error("tls configuration error: {0}")]
    Tls(String),
}

/// Listener transport type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Tls,
}

/// `TYPE:HOST:PORT`, e.g. `tcp:0.0.0.0:8080` or `tls:0.0.0.0:443`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddr {
    pub transport: Transport,
    pub host: String,
    pub port: u16,
}

impl ListenAddr {
    /// `HOST:PORT` suitable for binding
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.transport {
            Transport::Tcp => "tcp",
            Transport::Tls => "tls",
        };
        write!(f, "{}:{}:{}", kind, self.host, self.port)
    }
}

impl FromStr for ListenAddr {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidListen(s.to_string());
        let mut parts = s.splitn(3, ':');
        let (Some(kind), Some(host), Some(port)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        let transport = match kind {
            "tcp" => Transport::Tcp,
            "tls" => Transport::Tls,
            _ => return Err(invalid()),
        };
        let host_ok = !host.is_empty()
            && host
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b"_-.".contains(&b));
        let port_ok = (1..=5).contains(&port.len()) && port.bytes().all(|b| b.is_ascii_digit());
        if !host_ok || !port_ok {
            return Err(invalid());
        }
        let port = port.parse().map_err(|_| invalid())?;

        Ok(Self {
            transport,
            host: host.to_string(),
            port,
        })
    }
}

#[derive(Parser, Debug)]
#[command(name = "callrelay")]
#[command(about = "WebSocket signaling relay for two-party WebRTC calls on /call/{id}")]
#[command(version)]
pub struct Args {
    /// Enable debug level logging instead of default info
    #[arg(short = 'd', long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Listening address, e.g. tcp:0.0.0.0:8080 or tls:0.0.0.0:443
    #[arg(short, long, value_name = "TYPE:HOST:PORT")]
    pub listen: ListenAddr,

    /// Certificate chain in PEM format, for a TLS listener
    #[arg(long, value_name = "FILE")]
    pub certfile: Option<PathBuf>,

    /// Private key in PEM format, for a TLS listener
    #[arg(long, value_name = "FILE")]
    pub keyfile: Option<PathBuf>,

    /// Allowed request path prefix; 404 otherwise (repeatable)
    #[arg(long = "path", value_name = "PATH")]
    pub paths: Vec<String>,

    /// Allowed Host header value; 403 otherwise (repeatable)
    #[arg(long = "host", value_name = "HOST[:PORT]")]
    pub hosts: Vec<String>,

    /// Allowed Origin header value; 403 otherwise (repeatable)
    #[arg(long = "origin", value_name = "URL")]
    pub origins: Vec<String>,

    /// ICE server URL handed to clients (repeatable)
    #[arg(long = "ice-server", value_name = "URL", default_value = DEFAULT_ICE_SERVER)]
    pub ice_servers: Vec<String>,
}

/// PEM files for a TLS listener
#[derive(Debug, Clone)]
pub struct TlsFiles {
    pub certfile: PathBuf,
    pub keyfile: PathBuf,
}

/// Validated server configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen: ListenAddr,
    pub tls: Option<TlsFiles>,
    pub policy: AccessPolicy,
    pub peer_config: PeerConnectionConfig,
    pub log_level: Level,
}

impl TryFrom<Args> for RelayConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        let tls = match args.listen.transport {
            Transport::Tcp => None,
            Transport::Tls => match (args.certfile, args.keyfile) {
                (Some(certfile), Some(keyfile)) => Some(TlsFiles { certfile, keyfile }),
                _ => return Err(ConfigError::MissingTlsFiles),
            },
        };

        let log_level = if args.quiet {
            Level::ERROR
        } else if args.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        };

        Ok(Self {
            listen: args.listen,
            tls,
            policy: AccessPolicy {
                paths: args.paths,
                hosts: args.hosts,
                origins: args.origins,
            },
            peer_config: PeerConnectionConfig::new(args.ice_servers),
            log_level,
        })
    }
}
