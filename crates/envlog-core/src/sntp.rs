//! SNTP (RFC 4330) client packets.
//!
//! Only the codec lives here; the platform owns the UDP socket and DNS.

use chrono::DateTime;
use thiserror_no_std::Error;

use crate::reading::Timestamp;

pub const NTP_PORT: u16 = 123;
pub const PACKET_LEN: usize = 48;

/// Seconds between 1900-01-01 (NTP era 0) and 1970-01-01.
const NTP_UNIX_OFFSET: i64 = 2_208_988_800;

/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0b00_100_011;
const MODE_SERVER: u8 = 4;
const LEAP_ALARM: u8 = 3;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SntpError {
    #[error("reply is {len} bytes, expected at least 48")]
    ShortPacket { len: usize },
    #[error("reply has mode {mode}, expected a server reply")]
    UnexpectedMode { mode: u8 },
    #[error("server is not synchronized (stratum {stratum})")]
    Unsynchronized { stratum: u8 },
    #[error("transmit timestamp is out of range")]
    InvalidTime,
    #[error("no time server answered")]
    NoServer,
}

impl SntpError {
    /// Numeric code reported to the time-sync failure callback.
    pub fn code(&self) -> i32 {
        match self {
            Self::ShortPacket { .. } => 1,
            Self::UnexpectedMode { .. } => 2,
            Self::Unsynchronized { .. } => 3,
            Self::InvalidTime => 4,
            Self::NoServer => 5,
        }
    }
}

pub fn request_packet() -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Extract the server's transmit time (UTC) from a reply.
pub fn parse_response(packet: &[u8]) -> Result<Timestamp, SntpError> {
    if packet.len() < PACKET_LEN {
        return Err(SntpError::ShortPacket { len: packet.len() });
    }

    let mode = packet[0] & 0b111;
    if mode != MODE_SERVER {
        return Err(SntpError::UnexpectedMode { mode });
    }

    let stratum = packet[1];
    if stratum == 0 || packet[0] >> 6 == LEAP_ALARM {
        return Err(SntpError::Unsynchronized { stratum });
    }

    let seconds = u32::from_be_bytes([packet[40], packet[41], packet[42], packet[43]]);
    let fraction = u32::from_be_bytes([packet[44], packet[45], packet[46], packet[47]]);

    // With the top bit clear the value belongs to era 1, which starts in 2036
    let ntp_seconds = if seconds & 0x8000_0000 != 0 {
        i64::from(seconds)
    } else {
        i64::from(seconds) + (1i64 << 32)
    };
    let nanos = ((u64::from(fraction) * 1_000_000_000) >> 32) as u32;

    DateTime::from_timestamp(ntp_seconds - NTP_UNIX_OFFSET, nanos)
        .map(|utc| Timestamp::from_naive(utc.naive_utc()))
        .ok_or(SntpError::InvalidTime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(seconds: u32, fraction: u32) -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        packet[0] = 0b00_100_100;
        packet[1] = 2;
        packet[40..44].copy_from_slice(&seconds.to_be_bytes());
        packet[44..48].copy_from_slice(&fraction.to_be_bytes());
        packet
    }

    #[test]
    fn test_request_header() {
        let packet = request_packet();
        assert_eq!(packet[0] >> 6, 0);
        assert_eq!((packet[0] >> 3) & 0b111, 4);
        assert_eq!(packet[0] & 0b111, 3);
        assert!(packet[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_transmit_time() {
        let time = parse_response(&reply(3_924_945_000, 1 << 31)).unwrap();
        assert_eq!(time.to_string(), "05/17/2024 14:30:00");
        assert_eq!(time.naive().and_utc().timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_era_one_after_2036() {
        // 2040-01-01 00:00:00 UTC
        let time = parse_response(&reply(123_010_304, 0)).unwrap();
        assert_eq!(time.to_string(), "01/01/2040 00:00:00");
    }

    #[test]
    fn test_rejects_bad_replies() {
        assert_eq!(
            parse_response(&[0u8; 12]),
            Err(SntpError::ShortPacket { len: 12 })
        );

        let mut client_echo = reply(3_924_945_000, 0);
        client_echo[0] = CLIENT_HEADER;
        assert_eq!(
            parse_response(&client_echo),
            Err(SntpError::UnexpectedMode { mode: 3 })
        );

        let mut kiss_of_death = reply(3_924_945_000, 0);
        kiss_of_death[1] = 0;
        assert_eq!(
            parse_response(&kiss_of_death),
            Err(SntpError::Unsynchronized { stratum: 0 })
        );

        let mut alarm = reply(3_924_945_000, 0);
        alarm[0] |= 0b11 << 6;
        assert_eq!(
            parse_response(&alarm),
            Err(SntpError::Unsynchronized { stratum: 2 })
        );
    }
}
