//! AT-command adapter for a RAK3172-style LoRaWAN module on a UART.
//!
//! The module carries the entire MAC/PHY (join handshake, retries, receive
//! windows); this adapter only issues commands and translates the module's
//! unsolicited event lines into session-controller callbacks:
//!
//! ```text
//! +EVT:JOINED
//! +EVT:JOIN_FAILED
//! +EVT:CLASS:<A|B|C>
//! +EVT:RX_<w>:<rssi>:<snr>:<port>:<hex payload>
//! ```
//!
//! Commands are fire-and-forget: acceptance shows up as `OK`/`AT_ERROR`
//! lines on the event stream, outcomes as the events above.

use core::cell::RefCell;
use core::fmt::Write as _;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_time::{Duration, Timer};
use embedded_hal::digital::OutputPin;
use embedded_io::Write;
use embedded_io_async::Read;
use heapless::{String, Vec};
use log::{debug, warn};

use aer_core::codec;
use aer_core::config::RadioParams;
use aer_core::radio::{Credentials, DeviceClass, RadioError, RadioStack, Region, UplinkFrame};
use aer_core::session::SessionController;

/// Longest command line we ever emit: `AT+SEND=<port>:<128 hex chars>`.
const MAX_COMMAND: usize = 160;

/// `AT+BAND` region codes used by the module.
const fn band_code(region: Region) -> u8 {
    match region {
        Region::In865 => 3,
        Region::Eu868 => 4,
        Region::Us915 => 5,
        Region::Au915 => 6,
        Region::As923 => 8,
    }
}

/// Command half of the adapter. Shared `&self` across contexts; the UART
/// writer sits behind a critical-section mutex so a command is always
/// emitted as one contiguous line.
pub struct Rak3172<W> {
    tx: Mutex<CriticalSectionRawMutex, RefCell<W>>,
    join_trials: RefCell<u8>,
}

impl<W: Write> Rak3172<W> {
    pub fn new(tx: W) -> Self {
        Self {
            tx: Mutex::new(RefCell::new(tx)),
            join_trials: RefCell::new(8),
        }
    }

    fn command(&self, line: &str) -> Result<(), RadioError> {
        debug!("radio <- {line}");
        self.tx.lock(|tx| {
            let mut tx = tx.borrow_mut();
            tx.write_all(line.as_bytes())
                .and_then(|()| tx.write_all(b"\r\n"))
                .map_err(|_| RadioError::Hardware)
        })
    }

    fn command_fmt(&self, args: core::fmt::Arguments<'_>) -> Result<(), RadioError> {
        let mut line: String<MAX_COMMAND> = String::new();
        line.write_fmt(args).map_err(|_| RadioError::Rejected)?;
        self.command(&line)
    }
}

fn push_hex<const N: usize>(out: &mut String<N>, bytes: &[u8]) -> Result<(), RadioError> {
    for b in bytes {
        write!(out, "{b:02X}").map_err(|_| RadioError::Rejected)?;
    }
    Ok(())
}

impl<W: Write> RadioStack for Rak3172<W> {
    fn init(&self, params: &RadioParams) -> Result<(), RadioError> {
        *self.join_trials.borrow_mut() = params.join_trials;

        // LoRaWAN mode, then the MAC parameter block.
        self.command("AT+NWM=1")?;
        self.command_fmt(format_args!("AT+BAND={}", band_code(params.region)))?;
        self.command_fmt(format_args!("AT+ADR={}", params.adr as u8))?;
        self.command_fmt(format_args!("AT+DR={}", params.data_rate))?;
        self.command_fmt(format_args!("AT+TXP={}", params.tx_power))?;
        self.command_fmt(format_args!("AT+PNM={}", params.public_network as u8))?;
        self.command_fmt(format_args!("AT+DCS={}", params.duty_cycle as u8))
    }

    fn set_credentials(&self, credentials: &Credentials) -> Result<(), RadioError> {
        match credentials {
            Credentials::Otaa {
                dev_eui,
                app_eui,
                app_key,
            } => {
                self.command("AT+NJM=1")?;
                let mut line: String<MAX_COMMAND> = String::new();
                line.push_str("AT+DEVEUI=").map_err(|_| RadioError::Rejected)?;
                push_hex(&mut line, dev_eui)?;
                self.command(&line)?;

                line.clear();
                line.push_str("AT+APPEUI=").map_err(|_| RadioError::Rejected)?;
                push_hex(&mut line, app_eui)?;
                self.command(&line)?;

                line.clear();
                line.push_str("AT+APPKEY=").map_err(|_| RadioError::Rejected)?;
                push_hex(&mut line, app_key)?;
                self.command(&line)
            }
            Credentials::Abp {
                dev_addr,
                nwk_skey,
                app_skey,
            } => {
                self.command("AT+NJM=0")?;
                self.command_fmt(format_args!("AT+DEVADDR={dev_addr:08X}"))?;

                let mut line: String<MAX_COMMAND> = String::new();
                line.push_str("AT+NWKSKEY=").map_err(|_| RadioError::Rejected)?;
                push_hex(&mut line, nwk_skey)?;
                self.command(&line)?;

                line.clear();
                line.push_str("AT+APPSKEY=").map_err(|_| RadioError::Rejected)?;
                push_hex(&mut line, app_skey)?;
                self.command(&line)
            }
        }
    }

    fn configure_sub_band(&self, sub_band: u8) -> Result<(), RadioError> {
        if sub_band == 0 {
            return Err(RadioError::Rejected);
        }
        // Emitted for every region; narrow-band plans answer the line with
        // AT_PARAM_ERROR on the event stream and keep their fixed channels.
        self.command_fmt(format_args!("AT+MASK={:04X}", 1u16 << (sub_band - 1)))
    }

    fn join(&self) -> Result<(), RadioError> {
        let trials = *self.join_trials.borrow();
        self.command_fmt(format_args!("AT+JOIN=1:0:10:{trials}"))
    }

    fn send(&self, frame: &UplinkFrame) -> Result<(), RadioError> {
        let mut line: String<MAX_COMMAND> = String::new();
        write!(line, "AT+SEND={}:", frame.port).map_err(|_| RadioError::Rejected)?;
        push_hex(&mut line, frame.payload())?;
        self.command(&line)
    }

    fn request_class(&self, class: DeviceClass) -> Result<(), RadioError> {
        self.command_fmt(format_args!("AT+CLASS={}", class.letter()))
    }
}

// ---------------------------------------------------------------------------
// Event pump
// ---------------------------------------------------------------------------

/// Translate the module's event lines into session callbacks, forever.
///
/// Spawned as its own task; this is the "asynchronous context" the session
/// controller's callbacks run in. The join indicator pin is owned here and
/// driven low once the network accepts the node.
pub async fn event_pump<U, R, L>(
    mut rx: U,
    session: &SessionController<'_, R>,
    mut join_led: L,
) -> !
where
    U: Read,
    R: RadioStack,
    L: OutputPin,
{
    let mut line: Vec<u8, 200> = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = match rx.read(&mut buf).await {
            Ok(n) => n,
            Err(_) => {
                warn!("radio uart read error");
                Timer::after(Duration::from_millis(100)).await;
                continue;
            }
        };
        for &byte in &buf[..n] {
            match byte {
                b'\n' => {
                    if let Ok(text) = core::str::from_utf8(&line) {
                        handle_line(text.trim(), session, &mut join_led);
                    }
                    line.clear();
                }
                b'\r' => {}
                _ => {
                    if line.push(byte).is_err() {
                        // Oversized garbage; resynchronize on the next line.
                        line.clear();
                    }
                }
            }
        }
    }
}

fn handle_line<R: RadioStack>(
    line: &str,
    session: &SessionController<'_, R>,
    join_led: &mut impl OutputPin,
) {
    if line.is_empty() {
        return;
    }
    debug!("radio -> {line}");

    if line == "+EVT:JOINED" {
        let _ = join_led.set_low();
        session.on_joined();
    } else if line == "+EVT:JOIN_FAILED" {
        session.on_join_failed();
    } else if let Some(class) = line.strip_prefix("+EVT:CLASS:") {
        match class {
            "A" => session.on_class_confirmed(DeviceClass::A),
            "B" => session.on_class_confirmed(DeviceClass::B),
            "C" => session.on_class_confirmed(DeviceClass::C),
            other => warn!("unknown class confirmation: {other}"),
        }
    } else if line.starts_with("+EVT:RX_") {
        match codec::decode_rx_event(line) {
            Some(downlink) => session.on_downlink(&downlink),
            None => warn!("unparseable downlink event: {line}"),
        }
    }
}
