// Shared transport configuration for opening OVSDB connections.
//
// The JSON-RPC client is agnostic of the byte stream underneath; this
// module resolves endpoints and opens either a TCP or a Unix domain
// socket with the configured connect timeout.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use strum::{Display, EnumString};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;

/// Loopback address used when a TCP endpoint is requested without a host.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";
/// Standard OVSDB management port.
pub const DEFAULT_TCP_PORT: u16 = 6640;
/// Well-known location of the local `ovsdb-server` socket.
pub const DEFAULT_UNIX_ENDPOINT: &str = "/var/run/openvswitch/db.sock";

/// How to reach the database server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportKind {
    Tcp,
    Unix,
}

/// A resolved database server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Tcp { host: String, port: u16 },
    Unix(PathBuf),
}

impl Endpoint {
    /// Resolve a transport kind plus an optional raw address into an
    /// endpoint, applying the well-known defaults for empty input.
    ///
    /// TCP addresses are `host:port`; IPv6 hosts must be bracketed
    /// (`[::1]:6640`).
    pub fn resolve(kind: TransportKind, raw: &str) -> Result<Self, Error> {
        let raw = raw.trim();
        match kind {
            TransportKind::Tcp if raw.is_empty() => Ok(Self::Tcp {
                host: DEFAULT_TCP_HOST.into(),
                port: DEFAULT_TCP_PORT,
            }),
            TransportKind::Tcp => {
                let (host, port) = split_host_port(raw)?;
                Ok(Self::Tcp { host, port })
            }
            TransportKind::Unix if raw.is_empty() => {
                Ok(Self::Unix(PathBuf::from(DEFAULT_UNIX_ENDPOINT)))
            }
            TransportKind::Unix => Ok(Self::Unix(PathBuf::from(raw))),
        }
    }

    /// The transport kind this endpoint uses.
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Tcp { .. } => TransportKind::Tcp,
            Self::Unix(_) => TransportKind::Unix,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from(DEFAULT_UNIX_ENDPOINT))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => write!(f, "tcp:[{host}]:{port}"),
            Self::Tcp { host, port } => write!(f, "tcp:{host}:{port}"),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

fn split_host_port(raw: &str) -> Result<(String, u16), Error> {
    let invalid = || Error::InvalidEndpoint(format!("expected host:port, got '{raw}'"));

    let (host, port) = if let Some(rest) = raw.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = tail.strip_prefix(':').ok_or_else(invalid)?;
        (host, port)
    } else {
        let (host, port) = raw.rsplit_once(':').ok_or_else(invalid)?;
        if host.contains(':') {
            return Err(invalid());
        }
        (host, port)
    };

    let port: u16 = port
        .parse()
        .map_err(|_| Error::InvalidEndpoint(format!("invalid port '{port}' in '{raw}'")))?;
    let host = if host.is_empty() {
        DEFAULT_TCP_HOST.to_owned()
    } else {
        host.to_owned()
    };
    Ok((host, port))
}

/// Connection tuning shared by every OVSDB client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound on socket establishment.
    pub connect_timeout: Duration,
    /// Upper bound on a single request/reply round trip. `None` waits
    /// for as long as the connection stays open.
    pub request_timeout: Option<Duration>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

/// A connected, type-erased duplex byte stream.
pub(crate) trait Duplex: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Duplex for T {}

/// Open a socket to `endpoint`, bounded by the connect timeout.
pub(crate) async fn open(
    endpoint: &Endpoint,
    config: &TransportConfig,
) -> Result<Box<dyn Duplex>, Error> {
    let connect_err = |reason: String| Error::Connect {
        endpoint: endpoint.to_string(),
        reason,
    };

    let attempt = async {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let stream = tokio::net::TcpStream::connect((host.as_str(), *port)).await?;
                stream.set_nodelay(true)?;
                Ok::<Box<dyn Duplex>, std::io::Error>(Box::new(stream))
            }
            Endpoint::Unix(path) => open_unix(path).await,
        }
    };

    match tokio::time::timeout(config.connect_timeout, attempt).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) if e.kind() == std::io::ErrorKind::Unsupported => {
            Err(Error::UnsupportedTransport("unix"))
        }
        Ok(Err(e)) => Err(connect_err(e.to_string())),
        Err(_) => Err(connect_err(format!(
            "timed out after {}ms",
            config.connect_timeout.as_millis()
        ))),
    }
}

#[cfg(unix)]
async fn open_unix(path: &std::path::Path) -> Result<Box<dyn Duplex>, std::io::Error> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Box::new(stream))
}

#[cfg(not(unix))]
async fn open_unix(_path: &std::path::Path) -> Result<Box<dyn Duplex>, std::io::Error> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "unix domain sockets are not available on this platform",
    ))
}
