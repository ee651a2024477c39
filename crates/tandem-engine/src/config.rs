//! Engine configuration and validation.
//!
//! [`SyncConfig`] is the builder-input for a [`SyncEngine`](crate::SyncEngine).
//! Every value here is a tuning knob; none of the defaults is load-bearing
//! for correctness, only for bandwidth and detection latency.

use thiserror::Error;

use tandem_capture::FlushInterval;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected by [`SyncConfig::validate()`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The drift ring buffer cannot hold a single sample.
    #[error("drift_sample_capacity must be at least 1")]
    DriftCapacityZero,
    /// Opinions would never be exchanged.
    #[error("drift_exchange_interval must be at least 1 tick")]
    DriftIntervalZero,
    /// No past opinion could be compared against.
    #[error("drift_history must be at least 1")]
    DriftHistoryZero,
    /// The network → simulation channel cannot hold a single message.
    #[error("max_inbound_queue must be at least 1")]
    InboundQueueZero,
}

// ── SyncConfig ─────────────────────────────────────────────────────

/// Configuration for a [`SyncEngine`](crate::SyncEngine).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base seed. Each scope's random stream derives from it and the scope.
    pub seed: u64,
    /// Default change-buffer flush interval. Default: 200 ms.
    ///
    /// Field handlers may override it per field.
    pub flush_interval: FlushInterval,
    /// Samples kept between two opinion exchanges. Default: 256.
    pub drift_sample_capacity: usize,
    /// Ticks between opinion exchanges. Default: 30.
    pub drift_exchange_interval: u32,
    /// Past opinions kept per scope for late comparisons. Default: 16.
    pub drift_history: usize,
    /// Bound of the inbound channel. Default: 4096.
    pub max_inbound_queue: usize,
    /// Whether debug-only handlers may be captured and executed.
    pub debug_mode: bool,
    /// Ticks the loopback sequencer adds to its authority tick. Default: 2.
    pub scheduling_delay: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            flush_interval: FlushInterval::default(),
            drift_sample_capacity: 256,
            drift_exchange_interval: 30,
            drift_history: 16,
            max_inbound_queue: 4096,
            debug_mode: false,
            scheduling_delay: 2,
        }
    }
}

impl SyncConfig {
    /// Check structural invariants. Called by the engine constructor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.drift_sample_capacity == 0 {
            return Err(ConfigError::DriftCapacityZero);
        }
        if self.drift_exchange_interval == 0 {
            return Err(ConfigError::DriftIntervalZero);
        }
        if self.drift_history == 0 {
            return Err(ConfigError::DriftHistoryZero);
        }
        if self.max_inbound_queue == 0 {
            return Err(ConfigError::InboundQueueZero);
        }
        Ok(())
    }
}
