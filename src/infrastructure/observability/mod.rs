pub mod heartbeat;
pub mod metrics;
pub mod reporter;

pub use heartbeat::HeartbeatRegistry;
pub use metrics::Metrics;
pub use reporter::MetricsReporter;
