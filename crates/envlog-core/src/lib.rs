//! Hardware-independent core library for envlog
//!
//! This crate contains the whole acquisition-and-logging engine of the
//! temperature/humidity logger: the periodic sampling scheduler, the shared
//! latest-reading store, the append-only log on removable storage and the
//! control surface that reads and clears it over HTTP.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets (ESP32-S3) and desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod app_state;
pub mod config;
pub mod control;
pub mod reading;
pub mod sampling;
pub mod scheduler;
pub mod sensors;
pub mod sntp;
pub mod storage;
pub mod time_sync;
