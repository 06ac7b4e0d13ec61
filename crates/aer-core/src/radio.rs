//! Boundary types for the black-box LoRaWAN radio stack.
//!
//! The MAC/PHY layer (join handshake, retries, ADR, receive windows) lives
//! behind the [`RadioStack`] trait. This crate only drives that boundary and
//! reacts to its events; see [`crate::session`] for the reacting side.

use heapless::Vec;
use thiserror_no_std::Error;

/// Maximum uplink/downlink payload size the node ever hands the stack.
pub const MAX_PAYLOAD: usize = 64;

/// LoRaWAN device class, i.e. the current receive-window behavior.
///
/// Class changes go through an explicit request/confirm handshake with the
/// network; the node never flips its own class without a confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceClass {
    A = 0,
    B = 1,
    C = 2,
}

impl DeviceClass {
    /// Decode the single-byte wire encoding used by class-switch downlinks.
    pub const fn from_wire(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::A),
            1 => Some(Self::B),
            2 => Some(Self::C),
            _ => None,
        }
    }

    pub const fn letter(self) -> char {
        match self {
            Self::A => 'A',
            Self::B => 'B',
            Self::C => 'C',
        }
    }
}

/// Network region / channel plan selector, passed through to the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Eu868,
    Us915,
    Au915,
    As923,
    In865,
}

/// Device credentials for network activation.
#[derive(Debug, Clone, Copy)]
pub enum Credentials {
    /// Over-the-air activation: the session is negotiated at join time.
    Otaa {
        dev_eui: [u8; 8],
        app_eui: [u8; 8],
        app_key: [u8; 16],
    },
    /// Activation by personalization: pre-shared static session keys.
    Abp {
        dev_addr: u32,
        nwk_skey: [u8; 16],
        app_skey: [u8; 16],
    },
}

/// One outgoing application frame: payload bytes, length and destination
/// port, mirroring the stack's application-data record.
///
/// A frame is constructed fresh for every send, so a zero-length control
/// frame can never carry residual bytes from an earlier payload.
#[derive(Debug, Clone, Copy)]
pub struct UplinkFrame {
    buf: [u8; MAX_PAYLOAD],
    len: usize,
    /// Destination port.
    pub port: u8,
}

impl UplinkFrame {
    /// Create an empty (zero-length) frame for the given port.
    pub const fn empty(port: u8) -> Self {
        Self {
            buf: [0; MAX_PAYLOAD],
            len: 0,
            port,
        }
    }

    /// Append bytes to the payload.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> Result<(), PayloadOverflow> {
        let end = self.len + bytes.len();
        if end > MAX_PAYLOAD {
            return Err(PayloadOverflow);
        }
        self.buf[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Attempted to pack more payload than the stack's frame buffer holds.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("uplink payload exceeds {MAX_PAYLOAD} bytes")]
pub struct PayloadOverflow;

/// One received downlink: payload, source port and signal quality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Downlink {
    /// Source port the network sent the frame on.
    pub port: u8,
    /// Payload bytes.
    pub data: Vec<u8, MAX_PAYLOAD>,
    /// Received signal strength, dBm.
    pub rssi: i16,
    /// Signal-to-noise ratio, dB.
    pub snr: i8,
}

/// Errors surfaced by the radio stack.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("radio hardware initialization failed")]
    Hardware,
    #[error("MAC initialization failed")]
    Mac,
    #[error("request rejected by the MAC")]
    Rejected,
    #[error("MAC busy")]
    Busy,
    #[error("request timed out")]
    Timeout,
}

/// Black-box LoRaWAN stack boundary.
///
/// Implementations own their internal synchronization (methods take
/// `&self`) and deliver events by invoking the session controller's
/// callback methods from their own context. `send` submits the frame
/// unconfirmed and may block the caller for the duration of the
/// transmission; it performs no retries visible at this boundary.
pub trait RadioStack {
    /// Bring up the radio hardware and the MAC layer.
    fn init(&self, params: &crate::config::RadioParams) -> Result<(), RadioError>;

    /// Load device identity and keys. Must precede [`RadioStack::join`].
    fn set_credentials(&self, credentials: &Credentials) -> Result<(), RadioError>;

    /// Restrict the channel plan to one gateway sub-band.
    fn configure_sub_band(&self, sub_band: u8) -> Result<(), RadioError>;

    /// Start the join procedure. Completion is reported asynchronously via
    /// the joined / join-failed callbacks.
    fn join(&self) -> Result<(), RadioError>;

    /// Submit an unconfirmed uplink.
    fn send(&self, frame: &UplinkFrame) -> Result<(), RadioError>;

    /// Ask the network for a device class switch. Confirmation arrives
    /// asynchronously via the class-confirmed callback.
    fn request_class(&self, class: DeviceClass) -> Result<(), RadioError>;
}

// Forwarding impl so a stack can be shared by reference between the
// session controller and the platform's event pump.
impl<T: RadioStack> RadioStack for &T {
    fn init(&self, params: &crate::config::RadioParams) -> Result<(), RadioError> {
        T::init(self, params)
    }

    fn set_credentials(&self, credentials: &Credentials) -> Result<(), RadioError> {
        T::set_credentials(self, credentials)
    }

    fn configure_sub_band(&self, sub_band: u8) -> Result<(), RadioError> {
        T::configure_sub_band(self, sub_band)
    }

    fn join(&self) -> Result<(), RadioError> {
        T::join(self)
    }

    fn send(&self, frame: &UplinkFrame) -> Result<(), RadioError> {
        T::send(self, frame)
    }

    fn request_class(&self, class: DeviceClass) -> Result<(), RadioError> {
        T::request_class(self, class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_wire_decoding() {
        assert_eq!(DeviceClass::from_wire(0), Some(DeviceClass::A));
        assert_eq!(DeviceClass::from_wire(1), Some(DeviceClass::B));
        assert_eq!(DeviceClass::from_wire(2), Some(DeviceClass::C));
        assert_eq!(DeviceClass::from_wire(3), None);
        assert_eq!(DeviceClass::from_wire(0xff), None);
    }

    #[test]
    fn frame_rejects_overflow() {
        let mut frame = UplinkFrame::empty(2);
        frame.extend_from_slice(&[0u8; MAX_PAYLOAD]).unwrap();
        assert_eq!(frame.extend_from_slice(&[0]), Err(PayloadOverflow));
        assert_eq!(frame.len(), MAX_PAYLOAD);
    }

    #[test]
    fn fresh_frame_is_empty() {
        let frame = UplinkFrame::empty(3);
        assert!(frame.is_empty());
        assert_eq!(frame.payload(), &[]);
        assert_eq!(frame.port, 3);
    }
}
