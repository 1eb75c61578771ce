use std::time::Duration;

/// Tuning knobs of the protocol engine.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Interval between maintenance cycles (neighbor classification,
    /// position fan-out, timeout sweep).
    pub update_interval: Duration,
    /// Silence after which a neighbor is considered gone.
    pub timeout: Duration,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            // six position updates per second
            update_interval: Duration::from_millis(167),
            timeout: Duration::from_secs(10),
        }
    }
}
