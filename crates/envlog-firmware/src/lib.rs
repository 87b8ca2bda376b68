//! ESP32-S3 firmware-specific modules for envlog
//!
//! This crate contains hardware-specific code that cannot compile on desktop
//! targets: ESP32 peripheral initialization, the Wi-Fi link, and the embassy-net
//! tasks that serve the control surface and synchronize time.

#![no_std]

extern crate alloc;

pub mod hardware;
pub mod http_server;
pub mod sntp_client;
pub mod wifi;
