//! Network time over embassy-net UDP.
//!
//! Tries the primary server, then the alternate, on every refresh. Failures
//! are reported to the logger and never retried before the next refresh.

use embassy_net::Stack;
use embassy_net::dns::DnsQueryType;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_time::{Duration, Timer, with_timeout};
use envlog_core::config::TimeSyncConfig;
use envlog_core::reading::Timestamp;
use envlog_core::sntp::{self, NTP_PORT, PACKET_LEN, SntpError};
use log::{debug, info, warn};

use crate::hardware::Context;

const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

async fn query(stack: Stack<'_>, server: &str) -> Result<Timestamp, SntpError> {
    let addresses = stack
        .dns_query(server, DnsQueryType::A)
        .await
        .map_err(|e| {
            warn!("DNS lookup for {} failed: {:?}", server, e);
            SntpError::NoServer
        })?;
    let Some(&address) = addresses.first() else {
        return Err(SntpError::NoServer);
    };

    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 128];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 128];
    let mut socket = UdpSocket::new(
        stack,
        &mut rx_meta,
        &mut rx_buffer,
        &mut tx_meta,
        &mut tx_buffer,
    );

    socket.bind(0).map_err(|e| {
        warn!("Failed to bind SNTP socket: {:?}", e);
        SntpError::NoServer
    })?;

    socket
        .send_to(&sntp::request_packet(), (address, NTP_PORT))
        .await
        .map_err(|e| {
            warn!("Failed to send SNTP request to {}: {:?}", server, e);
            SntpError::NoServer
        })?;

    let mut reply = [0u8; PACKET_LEN];
    let (len, _) = with_timeout(REPLY_TIMEOUT, socket.recv_from(&mut reply))
        .await
        .map_err(|_| {
            warn!("{} did not answer within {} s", server, REPLY_TIMEOUT.as_secs());
            SntpError::NoServer
        })?
        .map_err(|e| {
            warn!("Failed to receive SNTP reply from {}: {:?}", server, e);
            SntpError::NoServer
        })?;

    sntp::parse_response(&reply[..len])
}

async fn query_servers(stack: Stack<'_>, config: &TimeSyncConfig<'_>) -> Result<Timestamp, SntpError> {
    let mut last_error = SntpError::NoServer;

    for server in config.servers() {
        match query(stack, server).await {
            Ok(now) => {
                debug!("Time from {}: {}", server, now);
                return Ok(now);
            }
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

#[embassy_executor::task]
pub async fn time_sync_task(
    stack: Stack<'static>,
    context: &'static Context,
    config: TimeSyncConfig<'static>,
) {
    stack.wait_config_up().await;
    info!(
        "Time sync via {} / {} every {} s",
        config.primary_server, config.alternate_server, config.refresh_interval_secs
    );

    if !config.force_sync_at_wake_up {
        Timer::after(config.refresh_interval()).await;
    }

    loop {
        match query_servers(stack, &config).await {
            Ok(now) => context.on_time_synchronized(now),
            Err(e) => context.on_time_sync_failed(e.code()),
        }

        Timer::after(config.refresh_interval()).await;
    }
}
