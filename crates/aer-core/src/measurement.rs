//! Particle measurement model and the sensor-side interface boundary.

use thiserror_no_std::Error;

/// One snapshot of the particulate sensor's output registers.
///
/// All concentrations are µg/m³, all counts are particles per 0.1 L of air.
/// The `*_standard` channels are normalized to standard atmosphere, the
/// `*_env` channels to ambient conditions. The node owns exactly one of
/// these and overwrites it in place each report cycle; nothing persists
/// across power cycles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParticleSample {
    /// PM1.0 concentration, standard atmosphere
    pub pm10_standard: u16,
    /// PM2.5 concentration, standard atmosphere
    pub pm25_standard: u16,
    /// PM10.0 concentration, standard atmosphere
    pub pm100_standard: u16,
    /// PM1.0 concentration, ambient conditions
    pub pm10_env: u16,
    /// PM2.5 concentration, ambient conditions
    pub pm25_env: u16,
    /// PM10.0 concentration, ambient conditions
    pub pm100_env: u16,
    /// Particles > 0.3 µm per 0.1 L
    pub particles_03um: u16,
    /// Particles > 0.5 µm per 0.1 L
    pub particles_05um: u16,
    /// Particles > 1.0 µm per 0.1 L
    pub particles_10um: u16,
    /// Particles > 2.5 µm per 0.1 L
    pub particles_25um: u16,
    /// Particles > 5.0 µm per 0.1 L
    pub particles_50um: u16,
    /// Particles > 10.0 µm per 0.1 L
    pub particles_100um: u16,
}

/// Size of a complete PMSx003 wire frame, magic and checksum included.
pub const PMS_FRAME_LEN: usize = 32;

impl ParticleSample {
    /// Decode one complete PMSx003 sensor frame.
    ///
    /// Layout after the two magic bytes: a big-endian length word (always
    /// 28, counting the thirteen data words plus the checksum), twelve
    /// measurement words, one reserved word, and a 16-bit additive checksum
    /// over everything before it.
    pub fn from_pms_frame(frame: &[u8; PMS_FRAME_LEN]) -> Result<Self, SensorError> {
        let word = |i: usize| u16::from_be_bytes([frame[2 + 2 * i], frame[3 + 2 * i]]);

        if word(0) != 28 {
            return Err(SensorError::BadFrame);
        }

        let claimed = u16::from_be_bytes([frame[PMS_FRAME_LEN - 2], frame[PMS_FRAME_LEN - 1]]);
        let computed = frame[..PMS_FRAME_LEN - 2]
            .iter()
            .fold(0u16, |sum, &b| sum.wrapping_add(b as u16));
        if claimed != computed {
            return Err(SensorError::Checksum);
        }

        Ok(Self {
            pm10_standard: word(1),
            pm25_standard: word(2),
            pm100_standard: word(3),
            pm10_env: word(4),
            pm25_env: word(5),
            pm100_env: word(6),
            particles_03um: word(7),
            particles_05um: word(8),
            particles_10um: word(9),
            particles_25um: word(10),
            particles_50um: word(11),
            particles_100um: word(12),
        })
    }
}

/// Errors a measurement source can report.
///
/// A failed read leaves the node's sample stale; the orchestrator skips the
/// encode/send and display steps for that cycle and waits for the next wake.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("no response from sensor")]
    NoResponse,
    #[error("sensor frame checksum mismatch")]
    Checksum,
    #[error("malformed sensor frame")]
    BadFrame,
}

/// Interface boundary to the physical particulate sensor.
pub trait MeasurementSource {
    /// Sample the sensor and return a fresh snapshot.
    fn read(&mut self) -> impl Future<Output = Result<ParticleSample, SensorError>>;
}

/// Interface boundary to the local display.
///
/// Rendering is cosmetic: it can neither fail nor block the session flow,
/// so both methods are infallible.
pub trait PresentationSink {
    /// Render a measurement snapshot.
    fn render(&mut self, sample: &ParticleSample);

    /// Render a short status line (boot progress, fatal errors).
    fn render_status(&mut self, status: &str);
}
