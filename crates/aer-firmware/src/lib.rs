//! Leaf driver glue for the aer-rs node: the particulate sensor, the OLED
//! status display and the AT-command LoRaWAN module adapter. Everything
//! with actual behavior lives in `aer-core`; this crate only binds it to
//! hardware.

#![no_std]

pub mod oled;
pub mod pms5003;
pub mod rak3172;
