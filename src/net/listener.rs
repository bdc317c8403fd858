//! Listen address parsing and binding.
//!
//! # Responsibilities
//! - Parse `tcp://host:port`, `unix:///path` and bare `host:port` addresses
//! - Bind TCP or Unix listeners for the configured address
//! - Derive loopback dial targets for local clients

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;

/// Error type for address parsing and binding.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Address could not be parsed.
    #[error("invalid listen address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// Failed to bind to address.
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

impl ListenerError {
    fn invalid(address: &str, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

/// A parsed listen address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenAddr {
    /// `host:port`.
    Tcp { host: String, port: u16 },
    /// Filesystem socket path.
    Unix(PathBuf),
}

impl ListenAddr {
    /// Port for TCP addresses.
    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Tcp { port, .. } => Some(*port),
            Self::Unix(_) => None,
        }
    }

    /// Dial target on the loopback interface for the same port.
    pub fn loopback(&self) -> Option<String> {
        self.port().map(|port| format!("127.0.0.1:{port}"))
    }

    /// Bind a listener for this address.
    pub async fn bind(&self) -> Result<BoundListener, ListenerError> {
        let bind_err = |source| ListenerError::Bind {
            address: self.to_string(),
            source,
        };
        match self {
            Self::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port))
                    .await
                    .map_err(bind_err)?;
                Ok(BoundListener::Tcp(listener))
            }
            #[cfg(unix)]
            Self::Unix(path) => {
                use std::os::unix::fs::FileTypeExt;

                // A stale socket file from a previous run blocks the bind.
                // Anything else at the path is left alone.
                match std::fs::symlink_metadata(path) {
                    Ok(meta) if meta.file_type().is_socket() => std::fs::remove_file(path).map_err(bind_err)?,
                    Ok(_) => {
                        return Err(bind_err(std::io::Error::new(
                            std::io::ErrorKind::AlreadyExists,
                            "path exists and is not a socket",
                        )))
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(bind_err(e)),
                }
                let listener = UnixListener::bind(path).map_err(bind_err)?;
                Ok(BoundListener::Unix(listener))
            }
            #[cfg(not(unix))]
            Self::Unix(_) => Err(ListenerError::invalid(
                &self.to_string(),
                "unix sockets are not supported on this platform",
            )),
        }
    }
}

impl FromStr for ListenAddr {
    type Err = ListenerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = match s.split_once("://") {
            Some((scheme, rest)) => (scheme, rest),
            None => ("tcp", s),
        };
        match scheme {
            "tcp" => {
                let (host, port) = split_host_port(rest).map_err(|reason| ListenerError::invalid(s, reason))?;
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            "unix" => {
                if rest.is_empty() {
                    return Err(ListenerError::invalid(s, "missing socket path"));
                }
                Ok(Self::Unix(PathBuf::from(rest)))
            }
            other => Err(ListenerError::invalid(s, format!("unsupported scheme '{other}'"))),
        }
    }
}

impl fmt::Display for ListenAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Split `host:port`, accepting an empty host (all interfaces) and bracketed IPv6.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), String> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| "missing port".to_string())?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port '{port}'"))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let host = if host.is_empty() { "0.0.0.0" } else { host };
    Ok((host, port))
}

/// A connection accepted by a `BoundListener`.
pub trait AcceptedStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AcceptedStream for T {}

/// A bound TCP or Unix listener.
#[derive(Debug)]
pub enum BoundListener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundListener {
    /// Accept the next connection and describe its peer.
    pub async fn accept(&self) -> std::io::Result<(Box<dyn AcceptedStream>, String)> {
        match self {
            Self::Tcp(l) => {
                let (stream, peer) = l.accept().await?;
                stream.set_nodelay(true)?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            Self::Unix(l) => {
                let (stream, _) = l.accept().await?;
                Ok((Box::new(stream), "unix".to_string()))
            }
        }
    }

    /// Human readable local address.
    pub fn local_addr(&self) -> String {
        match self {
            Self::Tcp(l) => l
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_else(|_| "unknown".to_string()),
            #[cfg(unix)]
            Self::Unix(l) => l
                .local_addr()
                .ok()
                .and_then(|a| a.as_pathname().map(|p| p.display().to_string()))
                .unwrap_or_else(|| "unknown".to_string()),
        }
    }
}
