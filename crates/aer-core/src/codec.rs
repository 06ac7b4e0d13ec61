//! Uplink payload packing and downlink command decoding.
//!
//! The uplink deliberately carries only two of the twelve sensor channels:
//! airtime on a duty-cycled network is the scarcest resource the node has.

use heapless::Vec;

use crate::measurement::ParticleSample;
use crate::radio::{DeviceClass, Downlink, MAX_PAYLOAD, UplinkFrame};

/// Size of an encoded measurement uplink.
pub const UPLINK_LEN: usize = 4;

/// Pack a measurement snapshot into a 4-byte uplink frame:
/// `[PM2.5_hi, PM2.5_lo, PM10_hi, PM10_lo]`, big-endian.
///
/// The field labeled PM10 on the wire is sourced from the snapshot's
/// 100-µm-cutoff standard channel, not the 10-µm one. Deployed decoders
/// depend on that mapping; do not "fix" it.
pub fn encode_uplink(sample: &ParticleSample, port: u8) -> UplinkFrame {
    let mut frame = UplinkFrame::empty(port);
    // 4 bytes always fit in a fresh frame.
    let _ = frame.extend_from_slice(&sample.pm25_standard.to_be_bytes());
    let _ = frame.extend_from_slice(&sample.pm100_standard.to_be_bytes());
    frame
}

/// Decode a class-switch command: valid only as a single byte 0/1/2.
/// Anything else is silently dropped, not an error.
pub fn decode_class_command(payload: &[u8]) -> Option<DeviceClass> {
    match payload {
        [byte] => DeviceClass::from_wire(*byte),
        _ => None,
    }
}

/// Parse a modem receive-event line as emitted by AT-command LoRaWAN
/// modules: `+EVT:RX_<w>:<rssi>:<snr>:<port>:<hex payload>`.
///
/// Any malformed field yields `None`; the caller drops the line.
pub fn decode_rx_event(line: &str) -> Option<Downlink> {
    let mut parts = line.split(':');
    parts.next()?; // +EVT
    parts.next()?; // RX_<window>
    let rssi: i16 = parts.next()?.parse().ok()?;
    let snr: i8 = parts.next()?.parse().ok()?;
    let port: u8 = parts.next()?.parse().ok()?;
    let data = decode_hex(parts.next()?)?;
    Some(Downlink {
        port,
        data,
        rssi,
        snr,
    })
}

fn decode_hex(text: &str) -> Option<Vec<u8, MAX_PAYLOAD>> {
    let bytes = text.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    let mut out = Vec::new();
    for pair in bytes.chunks_exact(2) {
        let hi = hex_val(pair[0])?;
        let lo = hex_val(pair[1])?;
        out.push(hi << 4 | lo).ok()?;
    }
    Some(out)
}

const fn hex_val(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}
