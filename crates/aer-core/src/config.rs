//! Node configuration, fixed at build/boot time.

use embassy_time::Duration;

use crate::radio::{Credentials, Region};

/// Default interval between report cycles.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(60_000);

/// Default port for measurement uplinks and application downlinks.
pub const DEFAULT_APP_PORT: u8 = 2;

/// Default port carrying class-switch commands.
pub const DEFAULT_CLASS_PORT: u8 = 3;

/// Default number of join trials the stack attempts before giving up.
pub const DEFAULT_JOIN_TRIALS: u8 = 8;

/// MAC parameter block handed to the stack at init, mirroring the usual
/// lmh-style parameter record.
#[derive(Debug, Clone, Copy)]
pub struct RadioParams {
    pub region: Region,
    /// Gateway sub-band (1-based) for regions that need one.
    pub sub_band: u8,
    /// Bounded join trial count; join failure after these is terminal.
    pub join_trials: u8,
    /// Adaptive data rate.
    pub adr: bool,
    pub public_network: bool,
    /// Fixed data rate used while ADR is off.
    pub data_rate: u8,
    /// TX power index.
    pub tx_power: u8,
    /// Duty-cycle enforcement by the MAC.
    pub duty_cycle: bool,
}

impl RadioParams {
    pub const fn new(region: Region) -> Self {
        Self {
            region,
            sub_band: 1,
            join_trials: DEFAULT_JOIN_TRIALS,
            adr: false,
            public_network: true,
            data_rate: 3,
            tx_power: 0,
            duty_cycle: false,
        }
    }
}

/// Everything the node needs to know at boot. Not runtime-mutable; build
/// one in a `static` and hand out references.
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    /// Interval between report cycles once joined.
    pub report_interval: Duration,
    /// Port for measurement uplinks and application downlinks.
    pub app_port: u8,
    /// Port carrying class-switch commands.
    pub class_port: u8,
    pub credentials: Credentials,
    pub radio: RadioParams,
}

impl NodeConfig {
    /// A config with the default cadence and port layout.
    pub const fn new(region: Region, credentials: Credentials) -> Self {
        Self {
            report_interval: DEFAULT_REPORT_INTERVAL,
            app_port: DEFAULT_APP_PORT,
            class_port: DEFAULT_CLASS_PORT,
            credentials,
            radio: RadioParams::new(region),
        }
    }
}
