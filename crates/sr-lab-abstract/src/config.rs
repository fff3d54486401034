use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Behaviour of the simulated channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimConfig {
    pub loss_rate: f64,
    pub corrupt_rate: f64,
    pub min_latency: u64,
    pub max_latency: u64,
    pub seed: u64,
    /// Stop the run once simulated time passes this point.
    #[serde(default)]
    pub time_limit: Option<u64>,
}

impl SimConfig {
    /// Longest time from sending a packet to hearing its acknowledgment.
    /// The channel never holds a packet longer than the larger latency
    /// bound, and the receiver answers on arrival.
    pub fn round_trip_bound(&self) -> u64 {
        2 * self.min_latency.max(self.max_latency)
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            corrupt_rate: 0.0,
            min_latency: 1,
            max_latency: 7,
            seed: 0,
            time_limit: None,
        }
    }
}

/// Protocol constants shared by sender and receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArqConfig {
    /// Maximum number of packets awaiting acknowledgment.
    pub window_size: u32,
    /// Size of the modular sequence-number space.
    pub seq_space: u32,
    /// Retransmission timeout in simulation ticks.
    pub rtt: u64,
}

impl ArqConfig {
    pub fn with_window_size(mut self, window_size: u32) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_seq_space(mut self, seq_space: u32) -> Self {
        self.seq_space = seq_space;
        self
    }

    pub fn with_rtt(mut self, rtt: u64) -> Self {
        self.rtt = rtt;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        if self.seq_space <= self.window_size {
            return Err(ConfigError::SequenceSpaceTooSmall {
                window_size: self.window_size,
                seq_space: self.seq_space,
            });
        }
        if self.rtt == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// Whether an old retransmission can share a number with a packet the
    /// receiver would accept as new. Happens below twice the window.
    pub fn may_alias(&self) -> bool {
        (self.seq_space as u64) < 2 * self.window_size as u64
    }

    /// Whether the timer can expire while an acknowledgment is still in
    /// flight on `channel`, resending a packet the receiver may already have
    /// delivered. Combined with [`ArqConfig::may_alias`] that copy can be
    /// taken for a new packet even on a loss-free channel.
    pub fn may_time_out_early(&self, channel: &SimConfig) -> bool {
        channel.round_trip_bound() >= self.rtt
    }
}

impl Default for ArqConfig {
    fn default() -> Self {
        Self {
            window_size: 6,
            seq_space: 7,
            rtt: 16,
        }
    }
}
