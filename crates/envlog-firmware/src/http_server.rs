use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_time::Duration;
use envlog_core::control::http::serve_connection;
use log::{debug, info, warn};

use crate::hardware::Context;

const SOCKET_TIMEOUT: Duration = Duration::from_secs(10);

/// Serve control requests one connection at a time.
#[embassy_executor::task]
pub async fn http_task(stack: Stack<'static>, context: &'static Context, port: u16) {
    let mut rx_buffer = [0u8; 1024];
    let mut tx_buffer = [0u8; 2048];

    stack.wait_config_up().await;
    if let Some(config) = stack.config_v4() {
        info!("Control surface on http://{}:{}", config.address.address(), port);
    }

    let surface = context.control_surface();

    loop {
        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(SOCKET_TIMEOUT));

        if let Err(e) = socket.accept(port).await {
            warn!("Failed to accept control connection: {:?}", e);
            continue;
        }
        debug!("Control connection from {:?}", socket.remote_endpoint());

        if let Err(e) = serve_connection(&mut socket, &surface).await {
            warn!("Control connection failed: {:?}", e);
        }

        socket.close();
        // Let the FIN go out before the buffers are reused
        let _ = socket.flush().await;
        socket.abort();
    }
}
