//! PMS5003/PMSA003-family particulate sensor over UART.
//!
//! The sensor streams 32-byte frames at 9600 baud. This module only does
//! the UART legwork (magic-byte resynchronization, timeout); the frame
//! decode itself lives with [`ParticleSample`].

use embassy_time::{Duration, with_timeout};
use embedded_io_async::Read;
use log::debug;

use aer_core::measurement::{MeasurementSource, PMS_FRAME_LEN, ParticleSample, SensorError};

const MAGIC: [u8; 2] = [0x42, 0x4D];

/// The sensor emits a frame roughly once a second; anything slower than
/// this means it is unpowered or disconnected.
const READ_TIMEOUT: Duration = Duration::from_secs(3);

/// UART-attached particulate sensor.
pub struct Pms5003<U> {
    uart: U,
}

impl<U: Read> Pms5003<U> {
    pub fn new(uart: U) -> Self {
        Self { uart }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), SensorError> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self
                .uart
                .read(&mut buf[filled..])
                .await
                .map_err(|_| SensorError::NoResponse)?;
            if n == 0 {
                return Err(SensorError::NoResponse);
            }
            filled += n;
        }
        Ok(())
    }

    /// Read one frame, resynchronizing on the magic bytes byte-by-byte.
    async fn read_frame(&mut self) -> Result<[u8; PMS_FRAME_LEN], SensorError> {
        let mut frame = [0u8; PMS_FRAME_LEN];

        // Hunt for the two-byte magic; the UART stream can start anywhere
        // inside a frame.
        let mut window = [0u8; 2];
        self.read_exact(&mut window).await?;
        while window != MAGIC {
            window[0] = window[1];
            let mut byte = [0u8; 1];
            self.read_exact(&mut byte).await?;
            window[1] = byte[0];
        }

        frame[..2].copy_from_slice(&MAGIC);
        self.read_exact(&mut frame[2..]).await?;
        Ok(frame)
    }
}

impl<U: Read> MeasurementSource for Pms5003<U> {
    async fn read(&mut self) -> Result<ParticleSample, SensorError> {
        let frame = with_timeout(READ_TIMEOUT, self.read_frame())
            .await
            .map_err(|_| SensorError::NoResponse)??;
        let sample = ParticleSample::from_pms_frame(&frame)?;
        debug!(
            "sensor frame: pm2.5={} pm10={}",
            sample.pm25_standard, sample.pm100_standard
        );
        Ok(sample)
    }
}
