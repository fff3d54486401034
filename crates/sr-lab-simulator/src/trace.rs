use serde::Serialize;
use sr_lab_abstract::{Payload, SimConfig};
use std::collections::HashMap;

use crate::engine::LinkEventSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub config: SimConfig,
    pub duration: u64,
    pub app_messages: Vec<Payload>,
    pub delivered_data: Vec<Payload>,
    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub lost_count: u32,
    pub corrupted_count: u32,
    pub window_full_count: u32,
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,
}

impl SimulationReport {
    /// Every application message arrived exactly once, in submission order.
    pub fn delivered_in_order(&self) -> bool {
        self.app_messages == self.delivered_data
    }

    pub fn retransmissions(&self) -> usize {
        self.metrics.get("retransmit").map_or(0, Vec::len)
    }

    /// Largest send-window occupancy the sender reported.
    pub fn max_window(&self) -> Option<u32> {
        self.metrics
            .get("window_count")?
            .iter()
            .map(|&(_, value)| value as u32)
            .max()
    }
}
