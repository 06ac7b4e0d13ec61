//! Desktop simulator for the aer-rs particulate monitoring node.
//!
//! Runs the full join -> report -> downlink flow of `aer-core` on the host
//! against a scripted stub radio: the "gateway" joins the node after a short
//! delay, later commands a switch to class B on the control port and drops
//! an application downlink mid-run. Particle data is synthetic (sinusoidal
//! PM levels), the display is the terminal.
//!
//! The report interval is shortened so a handful of cycles complete in a
//! few seconds; run with `RUST_LOG=debug` for the full event trace.

use core::cell::Cell;
use std::process::ExitCode;

use embassy_futures::join::join;
use embassy_futures::select::select;
use embassy_time::{Duration, Timer};
use log::{LevelFilter, info};

use aer_core::config::NodeConfig;
use aer_core::measurement::{MeasurementSource, ParticleSample, PresentationSink, SensorError};
use aer_core::node::Node;
use aer_core::radio::{
    Credentials, DeviceClass, Downlink, RadioError, Region, RadioStack, UplinkFrame,
};
use aer_core::scheduler::WakeScheduler;
use aer_core::session::SessionController;

/// Report cycles to run before exiting.
const REPORT_CYCLES: usize = 5;

/// Shortened report cadence for the simulation.
const SIM_REPORT_INTERVAL: Duration = Duration::from_millis(1_500);

// ---------------------------------------------------------------------------
// Stub radio
// ---------------------------------------------------------------------------

/// In-process stand-in for the LoRaWAN black box. Accepts everything and
/// records the last class request so the gateway script can confirm it.
struct SimRadio {
    uplinks: Cell<usize>,
    pending_class: Cell<Option<DeviceClass>>,
}

impl SimRadio {
    fn new() -> Self {
        Self {
            uplinks: Cell::new(0),
            pending_class: Cell::new(None),
        }
    }
}

impl RadioStack for SimRadio {
    fn init(&self, params: &aer_core::config::RadioParams) -> Result<(), RadioError> {
        info!(
            "radio: init region {:?}, {} join trials",
            params.region, params.join_trials
        );
        Ok(())
    }

    fn set_credentials(&self, credentials: &Credentials) -> Result<(), RadioError> {
        match credentials {
            Credentials::Otaa { .. } => info!("radio: OTAA credentials loaded"),
            Credentials::Abp { .. } => info!("radio: ABP session keys loaded"),
        }
        Ok(())
    }

    fn configure_sub_band(&self, sub_band: u8) -> Result<(), RadioError> {
        info!("radio: sub-band {sub_band}");
        Ok(())
    }

    fn join(&self) -> Result<(), RadioError> {
        info!("radio: join request submitted");
        Ok(())
    }

    fn send(&self, frame: &UplinkFrame) -> Result<(), RadioError> {
        self.uplinks.set(self.uplinks.get() + 1);
        info!(
            "radio: uplink #{} on port {}: {:02X?}",
            self.uplinks.get(),
            frame.port,
            frame.payload()
        );
        Ok(())
    }

    fn request_class(&self, class: DeviceClass) -> Result<(), RadioError> {
        info!("radio: class {} requested from network", class.letter());
        self.pending_class.set(Some(class));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Synthetic sensor and terminal display
// ---------------------------------------------------------------------------

/// Generates slowly varying PM readings.
struct SyntheticParticles {
    cycle: u32,
}

impl MeasurementSource for SyntheticParticles {
    async fn read(&mut self) -> Result<ParticleSample, SensorError> {
        self.cycle += 1;
        let t = self.cycle as f64;

        // Urban-ish PM2.5 between ~10 and ~40 µg/m³, PM10 a bit above it.
        let pm25 = 25.0 + 15.0 * (t / 7.0).sin();
        let pm100 = pm25 * 1.4 + 3.0 * (t / 3.0).cos();

        Ok(ParticleSample {
            pm25_standard: pm25 as u16,
            pm100_standard: pm100 as u16,
            pm10_standard: (pm25 * 0.6) as u16,
            pm25_env: pm25 as u16,
            pm100_env: pm100 as u16,
            pm10_env: (pm25 * 0.6) as u16,
            particles_03um: (pm25 * 40.0) as u16,
            particles_05um: (pm25 * 12.0) as u16,
            particles_10um: (pm25 * 4.0) as u16,
            particles_25um: (pm25 * 1.5) as u16,
            particles_50um: (pm25 * 0.4) as u16,
            particles_100um: (pm25 * 0.1) as u16,
        })
    }
}

struct ConsoleSink;

impl PresentationSink for ConsoleSink {
    fn render(&mut self, sample: &ParticleSample) {
        info!(
            "display: PM1.0 {:>3}  PM2.5 {:>3}  PM10 {:>3} µg/m³",
            sample.pm10_standard, sample.pm25_standard, sample.pm100_standard
        );
    }

    fn render_status(&mut self, status: &str) {
        info!("display: {status}");
    }
}

// ---------------------------------------------------------------------------
// Gateway script
// ---------------------------------------------------------------------------

/// Plays the network side: join accept, a class-B command on the control
/// port, the class confirmation and one application downlink.
async fn gateway_script(
    session: &SessionController<'_, &SimRadio>,
    radio: &SimRadio,
    config: &NodeConfig,
) {
    Timer::after_millis(400).await;
    session.on_joined();

    Timer::after_millis(2_000).await;
    session.on_downlink(&Downlink {
        port: config.class_port,
        data: heapless::Vec::from_slice(&[0x01]).unwrap(),
        rssi: -48,
        snr: 9,
    });

    Timer::after_millis(300).await;
    if let Some(class) = radio.pending_class.take() {
        session.on_class_confirmed(class);
    }

    Timer::after_millis(1_200).await;
    session.on_downlink(&Downlink {
        port: config.app_port,
        data: heapless::Vec::from_slice(b"ping").unwrap(),
        rssi: -51,
        snr: 8,
    });
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let mut config = NodeConfig::new(
        Region::Eu868,
        Credentials::Otaa {
            dev_eui: [0xAC, 0x1F, 0x09, 0xFF, 0xFE, 0x14, 0x77, 0x97],
            app_eui: [0x00; 8],
            app_key: [
                0x60, 0x69, 0xD2, 0x00, 0x5F, 0xF4, 0xA7, 0x4C, 0x9F, 0x29, 0x28, 0x7E, 0xAE,
                0x9C, 0x08, 0xD8,
            ],
        },
    );
    config.report_interval = SIM_REPORT_INTERVAL;

    let scheduler = WakeScheduler::new(config.report_interval);
    let radio = SimRadio::new();
    let session = SessionController::new(&radio, &config, &scheduler);

    // Boot sequence: sensor and display are always ready here; radio init
    // failures are boot-fatal.
    let mut sink = ConsoleSink;
    sink.render_status("booting");
    if let Err(e) = session.initialize() {
        sink.render_status("radio init failed");
        log::error!("boot aborted: {e}");
        return ExitCode::FAILURE;
    }
    sink.render_status("waiting for network join");

    let mut node = Node::new(
        &session,
        &scheduler,
        &config,
        SyntheticParticles { cycle: 0 },
        sink,
    );

    let node_loop = async {
        for _ in 0..REPORT_CYCLES {
            node.run_once().await;
        }
    };

    embassy_futures::block_on(select(
        node_loop,
        join(
            scheduler.run(),
            gateway_script(&session, &radio, &config),
        ),
    ));

    info!(
        "simulation complete: {} uplinks, class {}",
        radio.uplinks.get(),
        session.class().letter()
    );
    ExitCode::SUCCESS
}
