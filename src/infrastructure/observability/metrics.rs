use prometheus::{CounterVec, IntCounterVec, Opts, Registry, TextEncoder, Encoder};

/// Process-wide Prometheus counters for the scheduler, signal pipeline,
/// delivery filter and position monitor. Constructed once at startup and
/// handed to every component that needs to record an observation.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub ticks_run: IntCounterVec,
    pub ticks_skipped: IntCounterVec,
    pub signals_generated: IntCounterVec,
    pub change_events: IntCounterVec,
    pub deliveries: IntCounterVec,
    pub upstream_calls: IntCounterVec,
    pub position_triggers: IntCounterVec,
    pub delivery_latency_seconds: CounterVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let ticks_run = IntCounterVec::new(
            Opts::new("scheduler_ticks_run_total", "Scheduler ticks executed"),
            &["tick_kind"],
        )?;
        let ticks_skipped = IntCounterVec::new(
            Opts::new("scheduler_ticks_skipped_total", "Scheduler ticks skipped because the prior tick was still running"),
            &["instrument"],
        )?;
        let signals_generated = IntCounterVec::new(
            Opts::new("signals_generated_total", "Signals generated by source"),
            &["source"],
        )?;
        let change_events = IntCounterVec::new(
            Opts::new("change_events_total", "Signal change events emitted by reason"),
            &["reason"],
        )?;
        let deliveries = IntCounterVec::new(
            Opts::new("deliveries_total", "Delivery attempts by outcome"),
            &["outcome"],
        )?;
        let upstream_calls = IntCounterVec::new(
            Opts::new("upstream_calls_total", "Upstream fetcher calls by outcome"),
            &["outcome"],
        )?;
        let position_triggers = IntCounterVec::new(
            Opts::new("position_triggers_total", "Position monitor trigger events by status"),
            &["status"],
        )?;
        let delivery_latency_seconds = CounterVec::new(
            Opts::new("delivery_latency_seconds_total", "Cumulative delivery latency"),
            &["kind"],
        )?;

        registry.register(Box::new(ticks_run.clone()))?;
        registry.register(Box::new(ticks_skipped.clone()))?;
        registry.register(Box::new(signals_generated.clone()))?;
        registry.register(Box::new(change_events.clone()))?;
        registry.register(Box::new(deliveries.clone()))?;
        registry.register(Box::new(upstream_calls.clone()))?;
        registry.register(Box::new(position_triggers.clone()))?;
        registry.register(Box::new(delivery_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            ticks_run,
            ticks_skipped,
            signals_generated,
            change_events,
            deliveries,
            upstream_calls,
            position_triggers,
            delivery_latency_seconds,
        })
    }

    pub fn encode_text(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_without_error() {
        let metrics = Metrics::new().unwrap();
        metrics.ticks_run.with_label_values(&["signal"]).inc();
        let text = metrics.encode_text().unwrap();
        assert!(text.contains("scheduler_ticks_run_total"));
    }
}
