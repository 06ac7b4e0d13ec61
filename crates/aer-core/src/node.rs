//! Main cycle orchestrator: the sense -> encode -> send -> sleep loop.

use log::{debug, info, warn};

use crate::codec;
use crate::config::NodeConfig;
use crate::measurement::{MeasurementSource, ParticleSample, PresentationSink};
use crate::radio::{Downlink, RadioStack};
use crate::scheduler::WakeScheduler;
use crate::session::SessionController;

/// The node's single logical control flow.
///
/// Blocks on the wake scheduler between cycles, consuming no CPU; radio
/// callbacks and the report ticker run elsewhere and only communicate
/// through the wake signal and the session controller's shared fields.
/// Sends happen exclusively from this flow, never from a callback.
pub struct Node<'a, R, M, P>
where
    R: RadioStack,
    M: MeasurementSource,
    P: PresentationSink,
{
    session: &'a SessionController<'a, R>,
    scheduler: &'a WakeScheduler,
    config: &'a NodeConfig,
    source: M,
    sink: P,
    /// The one measurement snapshot, overwritten in place each cycle.
    sample: ParticleSample,
}

impl<'a, R, M, P> Node<'a, R, M, P>
where
    R: RadioStack,
    M: MeasurementSource,
    P: PresentationSink,
{
    pub fn new(
        session: &'a SessionController<'a, R>,
        scheduler: &'a WakeScheduler,
        config: &'a NodeConfig,
        source: M,
        sink: P,
    ) -> Self {
        Self {
            session,
            scheduler,
            config,
            source,
            sink,
            sample: ParticleSample::default(),
        }
    }

    /// Run the loop forever. The first report happens one full period
    /// after the join succeeds and arms the scheduler.
    pub async fn run(&mut self) -> ! {
        loop {
            self.run_once().await;
        }
    }

    /// Handle one wake.
    ///
    /// The wake tag says why the signal was last raised, but the signal
    /// coalesces, so both conditions are re-checked unconditionally: a
    /// coincident timer tick and downlink are each handled even though
    /// only one tag survived. Everything consumed here (signal, timer-due
    /// flag, inbox slot) is cleared before the next block, so a stale flag
    /// cannot cause a spurious second handling.
    pub async fn run_once(&mut self) {
        let kind = self.scheduler.wait().await;
        debug!("woke up: {kind:?}");

        if self.scheduler.take_timer_due() {
            self.report_cycle().await;
        }
        if let Some(downlink) = self.session.take_downlink() {
            self.handle_downlink(&downlink);
        }
    }

    /// One full sense -> render -> encode -> send pass.
    async fn report_cycle(&mut self) {
        match self.source.read().await {
            Ok(sample) => {
                self.sample = sample;
                self.sink.render(&self.sample);

                let frame = codec::encode_uplink(&self.sample, self.config.app_port);
                match self.session.send(&frame) {
                    Ok(()) => info!(
                        "sent pm2.5={} pm10={}",
                        self.sample.pm25_standard, self.sample.pm100_standard
                    ),
                    // No retry and no backoff: the next scheduled cycle
                    // is the retry.
                    Err(e) => warn!("uplink skipped: {e}"),
                }
            }
            Err(e) => {
                // Stale data is worse than no data: skip both the display
                // update and the send for this cycle.
                warn!("sensor read failed: {e}");
            }
        }
    }

    /// Application payload received from the network. The session callback
    /// already copied it out of the radio context; here it only gets
    /// surfaced.
    fn handle_downlink(&mut self, downlink: &Downlink) {
        info!(
            "application downlink: {} bytes on port {} (rssi {}, snr {})",
            downlink.data.len(),
            downlink.port,
            downlink.rssi,
            downlink.snr
        );
    }
}
