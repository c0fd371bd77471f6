//! The socket transport (§4.1, §6): newline-delimited JSON `Request`/
//! `Response` frames over a Unix-domain socket (the default) or a
//! loopback TCP listener with a handshake token (used on platforms with no
//! Unix sockets, or when forced via `KAGAN_FORCE_TCP`).
//!
//! Framing is intentionally dumb: one JSON value per line, flushed after
//! every write. There is no multiplexing at this layer — each accepted
//! connection is one session for its lifetime.

use std::time::Duration;

use kagan_protocol::{Request, Response};
use rand::RngCore;
use subtle::ConstantTimeEq;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, UnixListener, UnixStream};
use tokio::time::timeout;
use tracing::{info, warn};

/// A line longer than this is treated as a protocol violation and the
/// connection is dropped; guards against an unbounded read filling memory.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    Closed,
    #[error("line exceeded {MAX_LINE_BYTES} bytes")]
    LineTooLong,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("handshake failed")]
    HandshakeFailed,
    #[error("handshake timed out")]
    HandshakeTimeout,
}

/// One accepted connection, framed as newline-delimited JSON.
pub enum Connection {
    Unix(BufReader<UnixStream>),
    Tcp(BufReader<TcpStream>),
}

impl Connection {
    pub async fn read_request(&mut self) -> Result<Request, TransportError> {
        let line = read_line_bounded(self).await?;
        Ok(serde_json::from_str(&line)?)
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<(), TransportError> {
        let mut line = serde_json::to_string(response)?;
        line.push('\n');
        write_all(self, line.as_bytes()).await?;
        Ok(())
    }
}

async fn read_line_bounded(conn: &mut Connection) -> Result<String, TransportError> {
    let mut buf = Vec::new();
    let n = match conn {
        Connection::Unix(r) => r.read_until(b'\n', &mut buf).await?,
        Connection::Tcp(r) => r.read_until(b'\n', &mut buf).await?,
    };
    if n == 0 {
        return Err(TransportError::Closed);
    }
    if buf.len() > MAX_LINE_BYTES {
        return Err(TransportError::LineTooLong);
    }
    while buf.last() == Some(&b'\n') || buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn write_all(conn: &mut Connection, bytes: &[u8]) -> std::io::Result<()> {
    match conn {
        Connection::Unix(r) => {
            r.get_mut().write_all(bytes).await?;
            r.get_mut().flush().await
        }
        Connection::Tcp(r) => {
            r.get_mut().write_all(bytes).await?;
            r.get_mut().flush().await
        }
    }
}

/// Generates a 32-byte (64 hex char) token used both as the client auth
/// token embedded in the discovery file and, for TCP, the handshake secret.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// A bound listener, either Unix-domain or TCP-loopback.
pub enum Listener {
    Unix {
        listener: UnixListener,
        path: std::path::PathBuf,
    },
    Tcp {
        listener: TcpListener,
        handshake_token: String,
    },
}

impl Listener {
    /// Bind the Unix-domain socket at `path`, removing a stale socket file
    /// left by a crashed prior instance first. Sets mode 0600 so only the
    /// owning user can connect — no handshake token is needed on this path.
    #[cfg(unix)]
    pub async fn bind_unix(path: impl Into<std::path::PathBuf>) -> Result<Self, TransportError> {
        use std::os::unix::fs::PermissionsExt;

        let path = path.into();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let _ = std::fs::remove_file(&path);
        let listener = UnixListener::bind(&path)?;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)?;
        info!(path = %path.display(), "bound unix socket transport");
        Ok(Listener::Unix { listener, path })
    }

    /// Bind `127.0.0.1:0` (OS-assigned port) and generate a fresh handshake
    /// token every connecting client must present within 5s.
    pub async fn bind_tcp() -> Result<Self, TransportError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let handshake_token = generate_token();
        info!(addr = %listener.local_addr()?, "bound tcp loopback transport");
        Ok(Listener::Tcp {
            listener,
            handshake_token,
        })
    }

    pub fn local_port(&self) -> Option<u16> {
        match self {
            Listener::Tcp { listener, .. } => listener.local_addr().ok().map(|a| a.port()),
            Listener::Unix { .. } => None,
        }
    }

    /// Accept one connection and, for TCP, run the line-based handshake:
    /// the client sends the handshake token plus newline, we reply `OK\n`
    /// on a constant-time match or close silently on mismatch/timeout.
    pub async fn accept(&self) -> Result<Connection, TransportError> {
        match self {
            Listener::Unix { listener, .. } => {
                let (stream, _) = listener.accept().await?;
                Ok(Connection::Unix(BufReader::new(stream)))
            }
            Listener::Tcp {
                listener,
                handshake_token,
            } => {
                let (stream, _) = listener.accept().await?;
                let mut conn = Connection::Tcp(BufReader::new(stream));
                match timeout(HANDSHAKE_TIMEOUT, read_line_bounded(&mut conn)).await {
                    Ok(Ok(presented)) if tokens_match(&presented, handshake_token) => {
                        write_all(&mut conn, b"OK\n").await?;
                        Ok(conn)
                    }
                    Ok(Ok(_)) => {
                        warn!("tcp handshake token mismatch, closing connection");
                        Err(TransportError::HandshakeFailed)
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => {
                        warn!("tcp handshake timed out, closing connection");
                        Err(TransportError::HandshakeTimeout)
                    }
                }
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Listener::Unix { path, .. } = self {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn tokens_match(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}
