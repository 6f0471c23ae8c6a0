use crate::application::change_detector::ChangeDetector;
use crate::application::notification::NotificationBroker;
use crate::application::position_monitor::PositionMonitor;
use crate::application::signal_generator::SignalGenerator;
use crate::config::SchedulerConfig;
use crate::domain::types::Instrument;
use crate::infrastructure::observability::{HeartbeatRegistry, Metrics};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{self, Duration};
use tracing::{info, warn};

/// Two independent tick drivers (spec §4.5): a 15 min signal tick that fans
/// work out to a bounded worker pool, and a 60 s position tick. Kept as
/// separate loops — spec §9: "never share worker pools, so a slow signal
/// tick cannot starve PM."
pub struct Scheduler {
    instruments: Vec<Instrument>,
    signal_generator: Arc<SignalGenerator>,
    change_detector: Arc<ChangeDetector>,
    broker: Arc<NotificationBroker>,
    position_monitor: Arc<PositionMonitor>,
    config: SchedulerConfig,
    metrics: Metrics,
    heartbeats: Arc<HeartbeatRegistry>,
}

impl Scheduler {
    pub fn new(
        instruments: Vec<Instrument>,
        signal_generator: Arc<SignalGenerator>,
        change_detector: Arc<ChangeDetector>,
        broker: Arc<NotificationBroker>,
        position_monitor: Arc<PositionMonitor>,
        config: SchedulerConfig,
        metrics: Metrics,
        heartbeats: Arc<HeartbeatRegistry>,
    ) -> Self {
        Self {
            instruments,
            signal_generator,
            change_detector,
            broker,
            position_monitor,
            config,
            metrics,
            heartbeats,
        }
    }

    /// Runs both tick drivers until the process is cancelled.
    pub async fn run(self: Arc<Self>) {
        let signal_loop = {
            let this = self.clone();
            tokio::spawn(async move { this.run_signal_loop().await })
        };
        let position_loop = {
            let this = self.clone();
            tokio::spawn(async move { this.run_position_loop().await })
        };

        let _ = tokio::join!(signal_loop, position_loop);
    }

    async fn run_signal_loop(&self) {
        let mut ticker = time::interval(self.config.tick_signal);
        ticker.tick().await;

        let in_flight: Arc<tokio::sync::Mutex<HashSet<Instrument>>> =
            Arc::new(tokio::sync::Mutex::new(HashSet::new()));

        loop {
            ticker.tick().await;
            self.metrics.ticks_run.with_label_values(&["signal"]).inc();
            self.heartbeats.beat("signal_tick");

            let permits = Arc::new(Semaphore::new(self.config.worker_pool_size));
            let timeout = self.config.work_item_timeout(self.config.tick_signal);

            for instrument in self.instruments.clone() {
                let mut busy = in_flight.lock().await;
                if busy.contains(&instrument) {
                    self.metrics
                        .ticks_skipped
                        .with_label_values(&[&instrument.to_string()])
                        .inc();
                    warn!(%instrument, "tick_skipped: prior signal work item still running");
                    continue;
                }
                busy.insert(instrument);
                drop(busy);

                let permits = permits.clone();
                let in_flight = in_flight.clone();
                let signal_generator = self.signal_generator.clone();
                let change_detector = self.change_detector.clone();
                let broker = self.broker.clone();
                let metrics = self.metrics.clone();

                tokio::spawn(async move {
                    let _permit = permits.acquire_owned().await.expect("semaphore not closed");
                    let outcome = tokio::time::timeout(
                        timeout,
                        run_signal_work_item(instrument, signal_generator, change_detector, broker, &metrics),
                    )
                    .await;

                    if outcome.is_err() {
                        warn!(%instrument, "signal work item exceeded its time budget and was cancelled");
                    }

                    in_flight.lock().await.remove(&instrument);
                });
            }
        }
    }

    async fn run_position_loop(&self) {
        let mut ticker = time::interval(self.config.tick_position);
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.metrics.ticks_run.with_label_values(&["position"]).inc();
            self.heartbeats.beat("position_tick");

            let timeout = self.config.work_item_timeout(self.config.tick_position);
            if let Err(_elapsed) = tokio::time::timeout(timeout, self.position_monitor.tick()).await {
                warn!("position tick exceeded its time budget");
            }
        }
    }
}

async fn run_signal_work_item(
    instrument: Instrument,
    signal_generator: Arc<SignalGenerator>,
    change_detector: Arc<ChangeDetector>,
    broker: Arc<NotificationBroker>,
    metrics: &Metrics,
) {
    let signal = match signal_generator.generate(instrument).await {
        Ok(Some(signal)) => signal,
        Ok(None) => {
            info!(%instrument, "signal generator returned NoSignal");
            return;
        }
        Err(e) => {
            warn!(%instrument, error = %e, "signal generation failed");
            return;
        }
    };

    metrics
        .signals_generated
        .with_label_values(&[&format!("{:?}", signal.source)])
        .inc();

    let event = match change_detector.observe(signal).await {
        Ok(Some(event)) => event,
        Ok(None) => return,
        Err(e) => {
            warn!(%instrument, error = %e, "change detector failed");
            return;
        }
    };

    metrics
        .change_events
        .with_label_values(&[&format!("{:?}", event.reason)])
        .inc();

    if let Err(e) = broker.publish(event).await {
        warn!(%instrument, error = %e, "failed to publish change event");
    }
}
