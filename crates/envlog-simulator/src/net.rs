use embedded_io_async::{ErrorKind, ErrorType, Read, Write};
use envlog_core::app_state::LoggerContext;
use envlog_core::control::http::serve_connection;
use envlog_core::storage::{LogVolume, StorageMedium};
use log::{debug, info, warn};
use thiserror_no_std::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Error, Debug)]
#[error("TCP connection failed: {0}")]
pub struct ConnectionError(pub std::io::Error);

// The derive only provides Display without thiserror's `std` feature, which
// must stay off for the no_std core crate.
impl std::error::Error for ConnectionError {}

impl embedded_io_async::Error for ConnectionError {
    fn kind(&self) -> ErrorKind {
        match self.0.kind() {
            std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
                ErrorKind::ConnectionReset
            }
            std::io::ErrorKind::TimedOut => ErrorKind::TimedOut,
            _ => ErrorKind::Other,
        }
    }
}

/// A tokio TCP stream seen through the `embedded-io-async` traits, the way the
/// firmware sees its embassy-net socket.
pub struct Connection(TcpStream);

impl ErrorType for Connection {
    type Error = ConnectionError;
}

impl Read for Connection {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ConnectionError> {
        self.0.read(buf).await.map_err(ConnectionError)
    }
}

impl Write for Connection {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, ConnectionError> {
        self.0.write(buf).await.map_err(ConnectionError)
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.0.flush().await.map_err(ConnectionError)
    }
}

/// Accept control connections forever, one local task per connection.
///
/// Must run inside a [`tokio::task::LocalSet`].
pub async fn serve<V, M>(listener: TcpListener, context: &'static LoggerContext<'static, V, M>) -> !
where
    V: LogVolume + 'static,
    M: StorageMedium + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Control surface listening on http://{}", addr);
    }

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept control connection: {}", e);
                continue;
            }
        };
        debug!("Control connection from {}", peer);

        tokio::task::spawn_local(async move {
            let surface = context.control_surface();
            let mut conn = Connection(stream);

            if let Err(e) = serve_connection(&mut conn, &surface).await {
                warn!("Control connection from {} failed: {}", peer, e);
            }
            let _ = conn.0.shutdown().await;
        });
    }
}
