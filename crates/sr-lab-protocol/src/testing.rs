use sr_lab_abstract::{Packet, Payload, SystemContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOp {
    Start(u64),
    Stop,
}

/// Records every action an endpoint takes during a handler call.
#[derive(Default)]
pub struct RecordingContext {
    pub sent: Vec<Packet>,
    pub timer_ops: Vec<TimerOp>,
    pub delivered: Vec<Payload>,
    pub logs: Vec<String>,
    pub metrics: Vec<(String, f64)>,
}

impl RecordingContext {
    pub fn sent_seqs(&self) -> Vec<u32> {
        self.sent.iter().map(|p| p.seq_num).collect()
    }

    pub fn sent_acks(&self) -> Vec<Option<u32>> {
        self.sent.iter().map(|p| p.ack_num).collect()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl SystemContext for RecordingContext {
    fn send_packet(&mut self, packet: Packet) {
        self.sent.push(packet);
    }

    fn start_timer(&mut self, delay: u64) {
        self.timer_ops.push(TimerOp::Start(delay));
    }

    fn stop_timer(&mut self) {
        self.timer_ops.push(TimerOp::Stop);
    }

    fn deliver_data(&mut self, payload: &Payload) {
        self.delivered.push(*payload);
    }

    fn log(&mut self, message: &str) {
        self.logs.push(message.to_string());
    }

    fn now(&self) -> u64 {
        0
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.metrics.push((name.to_string(), value));
    }
}

/// Payload filled with one repeated letter, the way the lab generates traffic.
pub fn letters(c: u8) -> Payload {
    [c; sr_lab_abstract::PAYLOAD_SIZE]
}
