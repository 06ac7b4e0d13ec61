//! Hardware-independent core library for aer-rs
//!
//! This crate contains all platform-agnostic logic for the aer particulate
//! monitoring node: the measurement model, the uplink payload codec, the
//! network session controller driving the LoRaWAN black-box stack, the wake
//! scheduler and the main report-cycle orchestrator.
//!
//! It is `#![no_std]` so it compiles both for embedded targets (ESP32-S3
//! firmware) and desktop hosts (for the simulator and tests).

#![no_std]

pub mod codec;
pub mod config;
pub mod measurement;
pub mod node;
pub mod radio;
pub mod scheduler;
pub mod session;
