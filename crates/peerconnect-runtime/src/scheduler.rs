//! Discovery pulse scheduler
//!
//! Radio discovery windows are one-shot: an advertiser that starts after the
//! window opened may never be reported. The scheduler keeps discovery alive
//! by reissuing it on a fixed period. It holds no peer state; found events
//! travel straight from the transport to the core task through the sink.
//!
//! Timer fires are delivered to the core task as `Event::PulseFired`, tagged
//! with the run they belong to. [`DiscoveryScheduler::is_current`] rejects a
//! fire from a run that has since been stopped, and the state machine
//! additionally checks it is still discovering before calling
//! [`DiscoveryScheduler::pulse`].

use std::sync::Arc;
use std::time::Duration;

use peerconnect_core::{Event, EventSender, EventSink, Transport, TransportResult};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, trace};

pub struct DiscoveryScheduler {
    transport: Arc<dyn Transport>,
    namespace: String,
    period: Duration,
    events: EventSender,
    /// Identifies the current run; bumped by every start and stop
    run: u64,
    running: bool,
    timer: Option<JoinHandle<()>>,
    pulses: u64,
}

impl DiscoveryScheduler {
    pub fn new(
        transport: Arc<dyn Transport>,
        namespace: impl Into<String>,
        period: Duration,
        events: EventSender,
    ) -> Self {
        Self {
            transport,
            namespace: namespace.into(),
            period,
            events,
            run: 0,
            running: false,
            timer: None,
            pulses: 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Number of reissued discovery windows since creation
    pub fn pulses(&self) -> u64 {
        self.pulses
    }

    /// Issue discovery and, once it is accepted, arm the pulse timer
    ///
    /// A scheduler that is already running is stopped first.
    pub async fn start(&mut self, sink: EventSink) -> TransportResult<()> {
        self.stop().await;

        self.transport.discover(&self.namespace, sink).await?;

        self.run += 1;
        self.running = true;
        self.arm_timer();
        debug!(
            "Discovery started under '{}', pulsing every {:?}",
            self.namespace, self.period
        );
        Ok(())
    }

    /// Whether a `PulseFired { pulse }` belongs to the live run
    pub fn is_current(&self, pulse: u64) -> bool {
        self.running && pulse == self.run
    }

    /// Cancel the current discovery window and open a fresh one
    ///
    /// On failure the timer stays armed, so the next pulse retries.
    pub async fn pulse(&mut self, sink: EventSink) -> TransportResult<()> {
        self.pulses += 1;
        trace!("Discovery pulse {}", self.pulses);
        self.transport.stop_discovery().await;
        self.transport.discover(&self.namespace, sink).await
    }

    /// Cancel the timer and any in-flight discovery; safe when not running
    pub async fn stop(&mut self) {
        self.run += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        if self.running {
            self.running = false;
            self.transport.stop_discovery().await;
            debug!("Discovery stopped");
        }
    }

    fn arm_timer(&mut self) {
        let run = self.run;
        let period = self.period;
        let events = self.events.clone();

        self.timer = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if events.send(Event::PulseFired { pulse: run }).is_err() {
                    break;
                }
            }
        }));
    }
}

impl Drop for DiscoveryScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
