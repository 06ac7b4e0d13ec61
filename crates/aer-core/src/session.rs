//! Network session controller: join lifecycle, uplink dispatch, downlink
//! dispatch and class-switch negotiation against the black-box radio stack.
//!
//! One [`SessionController`] exists per node. It is shared by reference
//! between the orchestrator and the platform's radio event context; the
//! event context drives the four `on_*` callbacks, the orchestrator calls
//! [`SessionController::send`] and drains the inbox. All shared state is
//! either atomic or behind the critical-section inbox slot, and every write
//! that matters for a wake decision happens before the wake signal is
//! raised.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use log::{debug, error, info, warn};
use thiserror_no_std::Error;

use crate::codec;
use crate::config::NodeConfig;
use crate::radio::{DeviceClass, Downlink, RadioError, RadioStack, UplinkFrame};
use crate::scheduler::{EventKind, WakeScheduler};

/// Join lifecycle. Transitions are driven only by radio-stack callbacks;
/// nothing in this crate assumes `Joined` without having observed the
/// join-success callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Uninitialized = 0,
    Joining = 1,
    Joined = 2,
    /// Terminal until external reset; the stack's own bounded trial count
    /// has been exhausted and this layer issues no further join attempts.
    JoinFailed = 3,
}

const UNINITIALIZED: u8 = SessionState::Uninitialized as u8;
const JOINING: u8 = SessionState::Joining as u8;
const JOINED: u8 = SessionState::Joined as u8;

/// Boot-fatal initialization failures. The caller should halt and surface
/// the error rather than proceed into the main loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    #[error("radio stack init failed: {0}")]
    Stack(RadioError),
    #[error("channel configuration failed: {0}")]
    Channel(RadioError),
    #[error("session already initialized")]
    AlreadyInitialized,
}

/// Per-cycle send failures. Recoverable at cycle granularity: the caller
/// logs and waits for the next natural wake, never retries immediately.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    #[error("not joined to the network")]
    NotJoined,
    #[error("uplink rejected: {0}")]
    Rejected(RadioError),
}

/// Single-slot, latest-wins downlink inbox. An unread downlink is
/// overwritten the instant the next one arrives.
struct DownlinkInbox {
    slot: Mutex<CriticalSectionRawMutex, RefCell<Option<Downlink>>>,
}

impl DownlinkInbox {
    const fn new() -> Self {
        Self {
            slot: Mutex::new(RefCell::new(None)),
        }
    }

    fn put(&self, downlink: Downlink) {
        self.slot.lock(|slot| {
            if slot.borrow().is_some() {
                debug!("overwriting unread downlink");
            }
            *slot.borrow_mut() = Some(downlink);
        });
    }

    fn take(&self) -> Option<Downlink> {
        self.slot.lock(|slot| slot.borrow_mut().take())
    }
}

/// The session context object: radio handle, join state, current class and
/// the downlink inbox, owned in one place instead of free globals.
pub struct SessionController<'a, R: RadioStack> {
    radio: R,
    config: &'a NodeConfig,
    scheduler: &'a WakeScheduler,
    state: AtomicU8,
    class: AtomicU8,
    init_started: AtomicBool,
    inbox: DownlinkInbox,
}

impl<'a, R: RadioStack> SessionController<'a, R> {
    pub const fn new(radio: R, config: &'a NodeConfig, scheduler: &'a WakeScheduler) -> Self {
        Self {
            radio,
            config,
            scheduler,
            state: AtomicU8::new(UNINITIALIZED),
            class: AtomicU8::new(DeviceClass::A as u8),
            init_started: AtomicBool::new(false),
            inbox: DownlinkInbox::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state.load(Ordering::Acquire) {
            UNINITIALIZED => SessionState::Uninitialized,
            JOINING => SessionState::Joining,
            JOINED => SessionState::Joined,
            _ => SessionState::JoinFailed,
        }
    }

    /// Device class last confirmed by the network. Starts at class A.
    pub fn class(&self) -> DeviceClass {
        match self.class.load(Ordering::Acquire) {
            1 => DeviceClass::B,
            2 => DeviceClass::C,
            _ => DeviceClass::A,
        }
    }

    /// Bring up the stack, load credentials, restrict the channel plan and
    /// request the initial join. Call exactly once at boot; success means
    /// the join is pending, not complete.
    pub fn initialize(&self) -> Result<(), InitError> {
        if self.init_started.swap(true, Ordering::AcqRel) {
            return Err(InitError::AlreadyInitialized);
        }

        self.radio.init(&self.config.radio).map_err(InitError::Stack)?;
        self.radio
            .set_credentials(&self.config.credentials)
            .map_err(InitError::Stack)?;
        self.radio
            .configure_sub_band(self.config.radio.sub_band)
            .map_err(InitError::Channel)?;

        info!("starting network join request");
        self.radio.join().map_err(InitError::Stack)?;
        self.state.store(JOINING, Ordering::Release);
        Ok(())
    }

    /// Submit an unconfirmed uplink.
    ///
    /// The joined check is purely local: a node that never joined fails
    /// here without touching the radio, spending neither airtime nor
    /// battery. A stack reject is surfaced, not retried; retry policy is
    /// "wait for the next scheduled cycle".
    pub fn send(&self, frame: &UplinkFrame) -> Result<(), SendError> {
        if self.state() != SessionState::Joined {
            return Err(SendError::NotJoined);
        }
        self.radio.send(frame).map_err(SendError::Rejected)
    }

    /// Take the pending downlink, if any. Consuming it clears the inbox.
    pub fn take_downlink(&self) -> Option<Downlink> {
        self.inbox.take()
    }

    /// Callback: the stack completed the network join.
    ///
    /// The report cadence starts here and only here; a node that never
    /// joins never reports. Arming is idempotent, so a double-invoked
    /// callback cannot start a second cadence.
    pub fn on_joined(&self) {
        self.state.store(JOINED, Ordering::Release);
        info!("network joined");
        if self.scheduler.arm() {
            debug!("report timer armed");
        }
    }

    /// Callback: the stack exhausted its join trials.
    pub fn on_join_failed(&self) {
        self.state
            .store(SessionState::JoinFailed as u8, Ordering::Release);
        error!("network join failed; check keys and gateway coverage");
    }

    /// Callback: a downlink arrived. Dispatches by port: class commands on
    /// the control port, application payloads into the inbox (waking the
    /// orchestrator), everything else ignored.
    pub fn on_downlink(&self, downlink: &Downlink) {
        debug!(
            "downlink on port {}, {} bytes, rssi {} snr {}",
            downlink.port,
            downlink.data.len(),
            downlink.rssi,
            downlink.snr
        );

        if downlink.port == self.config.class_port {
            // The class does not change here; only on_class_confirmed
            // records it, once the network confirms the switch.
            match codec::decode_class_command(&downlink.data) {
                Some(class) => {
                    info!("request to switch to class {}", class.letter());
                    if let Err(e) = self.radio.request_class(class) {
                        warn!("class request rejected: {e}");
                    }
                }
                None => debug!("unrecognized class command dropped"),
            }
        } else if downlink.port == self.config.app_port {
            // Inbox write precedes the wake so the payload is visible to
            // whoever consumes the signal.
            self.inbox.put(downlink.clone());
            self.scheduler.raise(EventKind::Downlink);
        }
    }

    /// Callback: the network confirmed a class switch. Records the class
    /// and acknowledges with a freshly built zero-length frame on the
    /// application port, so no residual payload can leak into it.
    pub fn on_class_confirmed(&self, class: DeviceClass) {
        self.class.store(class as u8, Ordering::Release);
        info!("switched to class {}", class.letter());

        let heartbeat = UplinkFrame::empty(self.config.app_port);
        if let Err(e) = self.send(&heartbeat) {
            warn!("class-switch heartbeat not sent: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;
    use embassy_time::Duration;
    use heapless::Vec;

    use crate::config::{DEFAULT_APP_PORT, DEFAULT_CLASS_PORT};
    use crate::radio::{Credentials, Region};
    use crate::scheduler::SchedulerState;

    struct StubRadio {
        init_result: Cell<Result<(), RadioError>>,
        sub_band_result: Cell<Result<(), RadioError>>,
        send_result: Cell<Result<(), RadioError>>,
        inits: Cell<usize>,
        joins: Cell<usize>,
        sends: Cell<usize>,
        last_send: Cell<Option<UplinkFrame>>,
        class_requests: RefCell<Vec<DeviceClass, 4>>,
    }

    impl StubRadio {
        fn new() -> Self {
            Self {
                init_result: Cell::new(Ok(())),
                sub_band_result: Cell::new(Ok(())),
                send_result: Cell::new(Ok(())),
                inits: Cell::new(0),
                joins: Cell::new(0),
                sends: Cell::new(0),
                last_send: Cell::new(None),
                class_requests: RefCell::new(Vec::new()),
            }
        }
    }

    impl RadioStack for StubRadio {
        fn init(&self, _params: &crate::config::RadioParams) -> Result<(), RadioError> {
            self.inits.set(self.inits.get() + 1);
            self.init_result.get()
        }

        fn set_credentials(&self, _credentials: &Credentials) -> Result<(), RadioError> {
            Ok(())
        }

        fn configure_sub_band(&self, _sub_band: u8) -> Result<(), RadioError> {
            self.sub_band_result.get()
        }

        fn join(&self) -> Result<(), RadioError> {
            self.joins.set(self.joins.get() + 1);
            Ok(())
        }

        fn send(&self, frame: &UplinkFrame) -> Result<(), RadioError> {
            self.sends.set(self.sends.get() + 1);
            self.last_send.set(Some(*frame));
            self.send_result.get()
        }

        fn request_class(&self, class: DeviceClass) -> Result<(), RadioError> {
            self.class_requests.borrow_mut().push(class).unwrap();
            Ok(())
        }
    }

    fn test_config() -> NodeConfig {
        NodeConfig::new(
            Region::Eu868,
            Credentials::Otaa {
                dev_eui: [0; 8],
                app_eui: [0; 8],
                app_key: [0; 16],
            },
        )
    }

    fn test_scheduler() -> WakeScheduler {
        WakeScheduler::new(Duration::from_millis(60_000))
    }

    fn downlink(port: u8, data: &[u8]) -> Downlink {
        Downlink {
            port,
            data: Vec::from_slice(data).unwrap(),
            rssi: -45,
            snr: 7,
        }
    }

    #[test]
    fn initialize_requests_join() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);

        session.initialize().unwrap();
        assert_eq!(session.state(), SessionState::Joining);
        assert_eq!(session.radio.inits.get(), 1);
        assert_eq!(session.radio.joins.get(), 1);
    }

    #[test]
    fn initialize_is_single_shot() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);

        session.initialize().unwrap();
        assert_eq!(session.initialize(), Err(InitError::AlreadyInitialized));
        assert_eq!(session.radio.joins.get(), 1);
    }

    #[test]
    fn initialize_maps_stack_failure() {
        let config = test_config();
        let scheduler = test_scheduler();
        let radio = StubRadio::new();
        radio.init_result.set(Err(RadioError::Hardware));
        let session = SessionController::new(radio, &config, &scheduler);

        assert_eq!(
            session.initialize(),
            Err(InitError::Stack(RadioError::Hardware))
        );
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.radio.joins.get(), 0);
    }

    #[test]
    fn initialize_maps_channel_failure() {
        let config = test_config();
        let scheduler = test_scheduler();
        let radio = StubRadio::new();
        radio.sub_band_result.set(Err(RadioError::Rejected));
        let session = SessionController::new(radio, &config, &scheduler);

        assert_eq!(
            session.initialize(),
            Err(InitError::Channel(RadioError::Rejected))
        );
        assert_eq!(session.radio.joins.get(), 0);
    }

    #[test]
    fn send_before_join_never_touches_radio() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();

        let frame = UplinkFrame::empty(DEFAULT_APP_PORT);
        assert_eq!(session.send(&frame), Err(SendError::NotJoined));
        assert_eq!(session.radio.sends.get(), 0);
    }

    #[test]
    fn send_after_join_failed_is_rejected_locally() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_join_failed();

        assert_eq!(session.state(), SessionState::JoinFailed);
        let frame = UplinkFrame::empty(DEFAULT_APP_PORT);
        assert_eq!(session.send(&frame), Err(SendError::NotJoined));
        assert_eq!(session.radio.sends.get(), 0);
    }

    #[test]
    fn send_surfaces_stack_reject() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();
        session.radio.send_result.set(Err(RadioError::Busy));

        let frame = UplinkFrame::empty(DEFAULT_APP_PORT);
        assert_eq!(
            session.send(&frame),
            Err(SendError::Rejected(RadioError::Busy))
        );
        assert_eq!(session.radio.sends.get(), 1);
    }

    #[test]
    fn joining_arms_scheduler_exactly_once() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();

        session.on_joined();
        assert_eq!(session.state(), SessionState::Joined);
        assert_eq!(scheduler.state(), SchedulerState::Armed);

        // Erroneous double callback: arming stays idempotent.
        session.on_joined();
        assert_eq!(scheduler.state(), SchedulerState::Armed);
    }

    #[test]
    fn class_command_triggers_request() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        session.on_downlink(&downlink(DEFAULT_CLASS_PORT, &[0x01]));
        assert_eq!(
            session.radio.class_requests.borrow().as_slice(),
            &[DeviceClass::B]
        );
        // Only the confirmation flips the recorded class.
        assert_eq!(session.class(), DeviceClass::A);
    }

    #[test]
    fn malformed_class_commands_never_request() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        session.on_downlink(&downlink(DEFAULT_CLASS_PORT, &[]));
        session.on_downlink(&downlink(DEFAULT_CLASS_PORT, &[0x01, 0x02]));
        session.on_downlink(&downlink(DEFAULT_CLASS_PORT, &[0x03]));
        assert!(session.radio.class_requests.borrow().is_empty());
    }

    #[test]
    fn class_confirm_sends_zero_length_heartbeat() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        session.on_class_confirmed(DeviceClass::B);
        assert_eq!(session.class(), DeviceClass::B);
        assert_eq!(session.radio.sends.get(), 1);
        let heartbeat = session.radio.last_send.get().unwrap();
        assert_eq!(heartbeat.len(), 0);
        assert_eq!(heartbeat.port, DEFAULT_APP_PORT);
    }

    #[test]
    fn app_downlink_fills_inbox_and_wakes() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        let incoming = downlink(DEFAULT_APP_PORT, &[0xAA, 0xBB]);
        session.on_downlink(&incoming);

        assert_eq!(scheduler.try_wait(), Some(EventKind::Downlink));
        assert_eq!(session.take_downlink(), Some(incoming));
        assert_eq!(session.take_downlink(), None);
    }

    #[test]
    fn unread_downlink_is_overwritten_by_the_next() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        session.on_downlink(&downlink(DEFAULT_APP_PORT, &[0x01]));
        let second = downlink(DEFAULT_APP_PORT, &[0x02]);
        session.on_downlink(&second);

        assert_eq!(session.take_downlink(), Some(second));
        assert_eq!(session.take_downlink(), None);
    }

    #[test]
    fn unknown_ports_are_ignored() {
        let config = test_config();
        let scheduler = test_scheduler();
        let session = SessionController::new(StubRadio::new(), &config, &scheduler);
        session.initialize().unwrap();
        session.on_joined();

        session.on_downlink(&downlink(7, &[0x01]));
        assert!(session.radio.class_requests.borrow().is_empty());
        assert_eq!(session.take_downlink(), None);
        assert_eq!(scheduler.try_wait(), None);
    }
}
