//! TOML scenario files: channel overrides, protocol constants, a script of
//! application sends and injected faults, and checks to run afterwards.

use crate::config::{ArqConfig, SimConfig};
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub config: SimConfigOverride,
    #[serde(default)]
    pub protocol: ArqConfig,
    pub actions: Vec<TestAction>,
    pub assertions: Vec<TestAssertion>,
}

/// Channel settings a scenario may pin; unset fields keep their defaults.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct SimConfigOverride {
    pub loss_rate: Option<f64>,
    pub corrupt_rate: Option<f64>,
    pub min_latency: Option<u64>,
    pub max_latency: Option<u64>,
    pub seed: Option<u64>,
    pub time_limit: Option<u64>,
}

impl SimConfigOverride {
    pub fn apply_to(&self, base: &mut SimConfig) {
        base.loss_rate = self.loss_rate.unwrap_or(base.loss_rate);
        base.corrupt_rate = self.corrupt_rate.unwrap_or(base.corrupt_rate);
        base.min_latency = self.min_latency.unwrap_or(base.min_latency);
        base.max_latency = self.max_latency.unwrap_or(base.max_latency);
        base.seed = self.seed.unwrap_or(base.seed);
        base.time_limit = self.time_limit.or(base.time_limit);
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAction {
    /// The application submits `data` (at most one payload block) at `time`.
    AppSend { time: u64, data: String },
    /// Lose the first data packet carrying `seq`.
    DropNextFromSenderSeq { seq: u32 },
    /// Damage the first data packet carrying `seq`.
    CorruptNextFromSenderSeq { seq: u32 },
    /// Lose the first acknowledgment for `ack`.
    DropNextFromReceiverAck { ack: u32 },
}

#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TestAssertion {
    DataDelivered { data: String },
    /// Every submitted message came out exactly once, in submission order.
    AllDeliveredInOrder,
    /// Data packets put on the wire, retransmissions included.
    SenderPacketCount { min: u32, max: Option<u32> },
    Retransmissions { min: u32, max: Option<u32> },
    /// Peak number of unacknowledged packets the sender reported.
    SenderWindowMax { min: u32, max: Option<u32> },
    MaxDuration { ticks: u64 },
}
