//! Discrete-event harness around one sender and one receiver.
//!
//! Endpoints never touch the clock, the channel or the timers themselves.
//! Each handler runs against a [`ScopedContext`] that only records requests;
//! the simulator applies them once the handler returns, in this order:
//! metrics, logs, deliveries, timer operations, outgoing packets.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use sr_lab_abstract::{
    PAYLOAD_SIZE, Packet, PacketError, Payload, SimConfig, SubmitError, SystemContext,
    TransportProtocol, payload_from_bytes,
};
use tracing::{debug, info, warn};

use crate::trace::SimulationReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Sender,
    Receiver,
}

impl NodeId {
    pub fn peer(self) -> Self {
        match self {
            NodeId::Sender => NodeId::Receiver,
            NodeId::Receiver => NodeId::Sender,
        }
    }
}

#[derive(Debug)]
enum EventKind {
    PacketArrival { to: NodeId, packet: Packet },
    TimerExpiry { node: NodeId, generation: u64 },
    AppSend { payload: Payload },
}

#[derive(Debug)]
struct Event {
    time: u64,
    /// Insertion order; breaks ties between events at the same time.
    order: u64,
    kind: EventKind,
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        (self.time, self.order) == (other.time, other.order)
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    // BinaryHeap is a max-heap; reversed so the earliest event pops first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time, other.order).cmp(&(self.time, self.order))
    }
}

/// One line of the human-readable link timeline.
#[derive(Debug, Clone, Serialize)]
pub struct LinkEventSummary {
    pub time: u64,
    pub description: String,
}

#[derive(Debug, Clone, Copy)]
enum TimerOp {
    Start(u64),
    Stop,
}

/// Everything an endpoint asked for during one handler call.
#[derive(Default)]
struct Requests {
    packets: Vec<Packet>,
    timer_ops: Vec<TimerOp>,
    logs: Vec<String>,
    deliveries: Vec<Payload>,
    metrics: Vec<(String, f64)>,
}

struct ScopedContext<'a> {
    requests: &'a mut Requests,
    now: u64,
}

impl SystemContext for ScopedContext<'_> {
    fn send_packet(&mut self, packet: Packet) {
        self.requests.packets.push(packet);
    }

    fn start_timer(&mut self, delay: u64) {
        self.requests.timer_ops.push(TimerOp::Start(delay));
    }

    fn stop_timer(&mut self) {
        self.requests.timer_ops.push(TimerOp::Stop);
    }

    fn deliver_data(&mut self, payload: &Payload) {
        self.requests.deliveries.push(*payload);
    }

    fn log(&mut self, message: &str) {
        self.requests.logs.push(message.to_owned());
    }

    fn now(&self) -> u64 {
        self.now
    }

    fn record_metric(&mut self, name: &str, value: f64) {
        self.requests.metrics.push((name.to_owned(), value));
    }
}

/// The one timer each node owns.
#[derive(Debug, Default)]
struct TimerState {
    armed: bool,
    /// Bumped on every stop so stale expiry events can be recognised.
    generation: u64,
}

/// Scripted faults. Each entry hits the first matching packet, then is gone.
#[derive(Debug, Default)]
struct FaultPlan {
    drop_data: Vec<u32>,
    corrupt_data: Vec<u32>,
    drop_ack: Vec<u32>,
}

impl FaultPlan {
    fn take(entries: &mut Vec<u32>, value: u32) -> bool {
        match entries.iter().position(|&entry| entry == value) {
            Some(pos) => {
                entries.remove(pos);
                true
            }
            None => false,
        }
    }
}

pub struct Simulator {
    time: u64,
    queue: BinaryHeap<Event>,
    next_order: u64,

    config: SimConfig,
    rng: StdRng,

    pub sender: Box<dyn TransportProtocol>,
    pub receiver: Box<dyn TransportProtocol>,

    /// Every message the application asked to send, in order.
    pub app_messages: Vec<Payload>,
    /// Every payload handed up at the receiver, in order.
    pub delivered_data: Vec<Payload>,

    pub sender_packet_count: u32,
    pub receiver_packet_count: u32,
    pub lost_count: u32,
    pub corrupted_count: u32,
    /// Messages that found the send window full and had to wait.
    pub window_full_count: u32,

    /// `(time, value)` samples per metric name.
    pub metrics: HashMap<String, Vec<(u64, f64)>>,
    pub link_events: Vec<LinkEventSummary>,

    faults: FaultPlan,

    /// Messages refused with a full window, retried in order.
    backlog: VecDeque<Payload>,

    timers: HashMap<NodeId, TimerState>,

    /// Latest scheduled arrival per destination. New packets never land
    /// before it, so each direction stays FIFO.
    last_arrival: HashMap<NodeId, u64>,
}

impl Simulator {
    pub fn new(
        config: SimConfig,
        sender: Box<dyn TransportProtocol>,
        receiver: Box<dyn TransportProtocol>,
    ) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            time: 0,
            queue: BinaryHeap::new(),
            next_order: 0,
            config,
            rng,
            sender,
            receiver,
            app_messages: Vec::new(),
            delivered_data: Vec::new(),
            sender_packet_count: 0,
            receiver_packet_count: 0,
            lost_count: 0,
            corrupted_count: 0,
            window_full_count: 0,
            metrics: HashMap::new(),
            link_events: Vec::new(),
            faults: FaultPlan::default(),
            backlog: VecDeque::new(),
            timers: HashMap::new(),
            last_arrival: HashMap::new(),
        }
    }

    /// Lose the next data packet carrying `seq`.
    pub fn add_drop_sender_seq_once(&mut self, seq: u32) {
        self.faults.drop_data.push(seq);
    }

    /// Damage the next data packet carrying `seq`.
    pub fn add_corrupt_sender_seq_once(&mut self, seq: u32) {
        self.faults.corrupt_data.push(seq);
    }

    /// Lose the next acknowledgment for `ack`.
    pub fn add_drop_receiver_ack_once(&mut self, ack: u32) {
        self.faults.drop_ack.push(ack);
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn metric_series(&self, name: &str) -> Option<&[(u64, f64)]> {
        self.metrics.get(name).map(Vec::as_slice)
    }

    fn push_event(&mut self, time: u64, kind: EventKind) {
        self.queue.push(Event {
            time,
            order: self.next_order,
            kind,
        });
        self.next_order += 1;
    }

    pub fn schedule_app_send(&mut self, time: u64, payload: Payload) {
        self.push_event(time, EventKind::AppSend { payload });
    }

    /// Schedule a short message, zero-padded to the payload block.
    pub fn schedule_message(&mut self, time: u64, data: &[u8]) -> Result<(), PacketError> {
        let payload = payload_from_bytes(data)?;
        self.schedule_app_send(time, payload);
        Ok(())
    }

    pub fn init(&mut self) {
        self.dispatch(NodeId::Sender, |endpoint, ctx| endpoint.init(ctx));
        self.dispatch(NodeId::Receiver, |endpoint, ctx| endpoint.init(ctx));
    }

    /// Messages still waiting for room in the send window.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn timer_armed(&self, node: NodeId) -> bool {
        self.timers.get(&node).is_some_and(|t| t.armed)
    }

    /// Process the next event. Returns false once the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(event) = self.queue.pop() else {
            return false;
        };
        self.time = event.time;
        debug!("t={} {:?}", self.time, event.kind);

        match event.kind {
            EventKind::PacketArrival { to, packet } => {
                self.dispatch(to, |endpoint, ctx| endpoint.on_packet(ctx, packet));
                if to == NodeId::Sender {
                    self.flush_backlog();
                }
            }
            EventKind::TimerExpiry { node, generation } => {
                let timer = self.timers.entry(node).or_default();
                if !timer.armed || timer.generation != generation {
                    debug!("Ignoring expiry of a stopped {:?} timer", node);
                    return true;
                }
                timer.armed = false;
                self.dispatch(node, |endpoint, ctx| endpoint.on_timer(ctx));
            }
            EventKind::AppSend { payload } => {
                self.app_messages.push(payload);
                self.backlog.push_back(payload);
                self.flush_backlog();
                if !self.backlog.is_empty() {
                    self.window_full_count += 1;
                    let waiting = self.backlog.len();
                    self.note(format!("[Sender] WINDOW FULL, {waiting} message(s) waiting"));
                }
            }
        }
        true
    }

    /// Run until no events remain or the configured time limit passes.
    pub fn run_until_complete(&mut self) {
        self.init();
        while self.step() {
            if let Some(limit) = self.config.time_limit
                && self.time >= limit
            {
                info!(
                    "Time limit {} reached with {} events pending",
                    limit,
                    self.queue.len()
                );
                break;
            }
        }
    }

    pub fn export_report(&self) -> SimulationReport {
        SimulationReport {
            config: self.config.clone(),
            duration: self.time,
            app_messages: self.app_messages.clone(),
            delivered_data: self.delivered_data.clone(),
            sender_packet_count: self.sender_packet_count,
            receiver_packet_count: self.receiver_packet_count,
            lost_count: self.lost_count,
            corrupted_count: self.corrupted_count,
            window_full_count: self.window_full_count,
            metrics: self.metrics.clone(),
            link_events: self.link_events.clone(),
        }
    }

    /// Run one handler on `node` and apply whatever it requested.
    fn dispatch<R>(
        &mut self,
        node: NodeId,
        handler: impl FnOnce(&mut dyn TransportProtocol, &mut dyn SystemContext) -> R,
    ) -> R {
        let mut requests = Requests::default();
        let result = {
            let mut ctx = ScopedContext {
                requests: &mut requests,
                now: self.time,
            };
            let endpoint = match node {
                NodeId::Sender => self.sender.as_mut(),
                NodeId::Receiver => self.receiver.as_mut(),
            };
            handler(endpoint, &mut ctx)
        };
        self.apply(node, requests);
        result
    }

    /// Hand waiting messages to the sender, oldest first, until it refuses one.
    fn flush_backlog(&mut self) {
        while let Some(&payload) = self.backlog.front() {
            let result =
                self.dispatch(NodeId::Sender, |endpoint, ctx| endpoint.on_app_data(ctx, payload));
            match result {
                Ok(()) => {
                    self.backlog.pop_front();
                }
                Err(SubmitError::WindowFull { in_flight }) => {
                    debug!("Send window full ({} in flight), message waits", in_flight);
                    break;
                }
                Err(err) => {
                    warn!("Sender refused message, discarding it: {}", err);
                    self.backlog.pop_front();
                }
            }
        }
    }

    fn note(&mut self, description: String) {
        self.link_events.push(LinkEventSummary {
            time: self.time,
            description,
        });
    }

    fn apply(&mut self, node: NodeId, requests: Requests) {
        for (name, value) in requests.metrics {
            self.metrics
                .entry(name)
                .or_default()
                .push((self.time, value));
        }

        for line in requests.logs {
            debug!("[{:?}] {}", node, line);
        }

        for payload in requests.deliveries {
            info!(
                "[{:?}] delivered \"{}\"",
                node,
                String::from_utf8_lossy(&payload).trim_end_matches('\0')
            );
            self.note(format!("[{node:?}] DELIVER {PAYLOAD_SIZE} bytes to application"));
            self.delivered_data.push(payload);
        }

        for op in requests.timer_ops {
            self.apply_timer_op(node, op);
        }

        for packet in requests.packets {
            self.transmit(node, packet);
        }
    }

    fn apply_timer_op(&mut self, node: NodeId, op: TimerOp) {
        let now = self.time;
        let timer = self.timers.entry(node).or_default();
        match op {
            TimerOp::Start(delay) => {
                if timer.armed {
                    warn!("[{:?}] timer started while already running, ignored", node);
                    return;
                }
                timer.armed = true;
                let generation = timer.generation;
                self.push_event(now + delay, EventKind::TimerExpiry { node, generation });
            }
            TimerOp::Stop => {
                if !timer.armed {
                    warn!("[{:?}] timer stopped while not running", node);
                    return;
                }
                timer.armed = false;
                timer.generation += 1;
            }
        }
    }

    /// Push one packet through the channel: scripted faults, then random
    /// loss, then random corruption, then a FIFO-respecting delay.
    fn transmit(&mut self, source: NodeId, mut packet: Packet) {
        let target = source.peer();
        let mut force_corrupt = false;

        match source {
            NodeId::Sender => {
                self.sender_packet_count += 1;
                if FaultPlan::take(&mut self.faults.drop_data, packet.seq_num) {
                    self.lose(source, &packet, "scripted");
                    return;
                }
                force_corrupt = FaultPlan::take(&mut self.faults.corrupt_data, packet.seq_num);
            }
            NodeId::Receiver => {
                self.receiver_packet_count += 1;
                if let Some(ack) = packet.ack_num
                    && FaultPlan::take(&mut self.faults.drop_ack, ack)
                {
                    self.lose(source, &packet, "scripted");
                    return;
                }
            }
        }

        if self.rng.random::<f64>() < self.config.loss_rate {
            self.lose(source, &packet, "random");
            return;
        }

        if force_corrupt || self.rng.random::<f64>() < self.config.corrupt_rate {
            let field = self.corrupt(&mut packet);
            self.corrupted_count += 1;
            debug!("{:?} packet corrupted in channel ({})", source, field);
            self.note(format!(
                "[{source:?}->{target:?}] CORRUPT {field} seq={} ack={:?}",
                packet.seq_num, packet.ack_num
            ));
        }

        let lo = self.config.min_latency.min(self.config.max_latency);
        let hi = self.config.min_latency.max(self.config.max_latency);
        let latency = self.rng.random_range(lo..=hi);
        let floor = self.last_arrival.get(&target).copied().unwrap_or(0);
        let arrival = (self.time + latency).max(floor);
        self.last_arrival.insert(target, arrival);

        self.note(format!(
            "[{source:?}->{target:?}] SEND seq={} ack={:?} (arrives at {arrival})",
            packet.seq_num, packet.ack_num
        ));
        self.push_event(arrival, EventKind::PacketArrival { to: target, packet });
    }

    fn lose(&mut self, source: NodeId, packet: &Packet, cause: &str) {
        self.lost_count += 1;
        debug!("{:?} packet lost in channel ({})", source, cause);
        self.note(format!(
            "[{source:?}->{:?}] DROP ({cause}) seq={} ack={:?}",
            source.peer(),
            packet.seq_num,
            packet.ack_num
        ));
    }

    /// Damage exactly one header or payload field. The stored checksum is
    /// left alone so the receiver can always notice.
    fn corrupt(&mut self, packet: &mut Packet) -> &'static str {
        let bit = 1u32 << self.rng.random_range(0..8);
        match self.rng.random_range(0..4) {
            0 => {
                packet.seq_num ^= bit;
                "seq"
            }
            1 => {
                packet.ack_num = Some(packet.raw_ack() ^ bit);
                "ack"
            }
            _ => {
                let index = self.rng.random_range(0..PAYLOAD_SIZE);
                packet.payload[index] = if packet.payload[index] == b'z' {
                    b'Z'
                } else {
                    b'z'
                };
                "payload"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeId, Simulator};
    use sr_lab_abstract::{Packet, Payload, SimConfig, SubmitError, SystemContext, TransportProtocol};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Shared log of everything a probe endpoint observed.
    #[derive(Default)]
    struct Observed {
        timer_fires: Vec<u64>,
        arrivals: Vec<(u64, Packet)>,
    }

    /// Endpoint whose behaviour is scripted by the test.
    struct Probe {
        observed: Rc<RefCell<Observed>>,
        on_init: fn(&mut dyn SystemContext),
        on_fire: fn(&mut dyn SystemContext, usize),
        capacity: usize,
        accepted: usize,
    }

    impl Probe {
        fn new(observed: Rc<RefCell<Observed>>) -> Self {
            Self {
                observed,
                on_init: |_| {},
                on_fire: |_, _| {},
                capacity: usize::MAX,
                accepted: 0,
            }
        }
    }

    impl TransportProtocol for Probe {
        fn init(&mut self, ctx: &mut dyn SystemContext) {
            (self.on_init)(ctx);
        }

        fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
            self.observed
                .borrow_mut()
                .arrivals
                .push((ctx.now(), packet));
            // Acknowledging frees room for one more message.
            self.capacity = self.capacity.saturating_add(1);
        }

        fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
            let fired = {
                let mut observed = self.observed.borrow_mut();
                observed.timer_fires.push(ctx.now());
                observed.timer_fires.len()
            };
            (self.on_fire)(ctx, fired);
        }

        fn on_app_data(
            &mut self,
            ctx: &mut dyn SystemContext,
            payload: Payload,
        ) -> Result<(), SubmitError> {
            if self.accepted >= self.capacity {
                return Err(SubmitError::WindowFull {
                    in_flight: self.accepted as u32,
                });
            }
            self.accepted += 1;
            ctx.send_packet(Packet::data(self.accepted as u32 - 1, payload));
            Ok(())
        }
    }

    fn pair(config: SimConfig, sender: Probe, receiver: Probe) -> Simulator {
        Simulator::new(config, Box::new(sender), Box::new(receiver))
    }

    #[test]
    fn stopped_timer_never_fires() {
        let observed = Rc::new(RefCell::new(Observed::default()));
        let mut sender = Probe::new(observed.clone());
        sender.on_init = |ctx| {
            ctx.start_timer(10);
            ctx.stop_timer();
        };
        let receiver = Probe::new(Rc::new(RefCell::new(Observed::default())));

        let mut sim = pair(SimConfig::default(), sender, receiver);
        sim.run_until_complete();

        assert!(observed.borrow().timer_fires.is_empty());
        assert!(!sim.timer_armed(NodeId::Sender));
    }

    #[test]
    fn second_start_while_armed_is_ignored() {
        let observed = Rc::new(RefCell::new(Observed::default()));
        let mut sender = Probe::new(observed.clone());
        sender.on_init = |ctx| {
            ctx.start_timer(10);
            ctx.start_timer(3);
        };
        let receiver = Probe::new(Rc::new(RefCell::new(Observed::default())));

        let mut sim = pair(SimConfig::default(), sender, receiver);
        sim.run_until_complete();

        assert_eq!(observed.borrow().timer_fires, vec![10]);
    }

    #[test]
    fn timer_can_be_rearmed_from_its_own_expiry() {
        let observed = Rc::new(RefCell::new(Observed::default()));
        let mut sender = Probe::new(observed.clone());
        sender.on_init = |ctx| ctx.start_timer(5);
        sender.on_fire = |ctx, fired| {
            if fired < 3 {
                ctx.start_timer(5);
            }
        };
        let receiver = Probe::new(Rc::new(RefCell::new(Observed::default())));

        let mut sim = pair(SimConfig::default(), sender, receiver);
        sim.run_until_complete();

        assert_eq!(observed.borrow().timer_fires, vec![5, 10, 15]);
    }

    #[test]
    fn channel_preserves_send_order() {
        let arrivals = Rc::new(RefCell::new(Observed::default()));
        let sender = Probe::new(Rc::new(RefCell::new(Observed::default())));
        let receiver = Probe::new(arrivals.clone());
        let config = SimConfig {
            min_latency: 1,
            max_latency: 50,
            seed: 7,
            ..Default::default()
        };

        let mut sim = pair(config, sender, receiver);
        for i in 0..20u8 {
            sim.schedule_message(i as u64, &[b'a' + i]).unwrap();
        }
        sim.run_until_complete();

        let observed = arrivals.borrow();
        let seqs: Vec<u32> = observed.arrivals.iter().map(|(_, p)| p.seq_num).collect();
        assert_eq!(seqs, (0..20).collect::<Vec<_>>());
        assert!(observed.arrivals.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn corruption_is_always_detectable() {
        let arrivals = Rc::new(RefCell::new(Observed::default()));
        let sender = Probe::new(Rc::new(RefCell::new(Observed::default())));
        let receiver = Probe::new(arrivals.clone());
        let config = SimConfig {
            corrupt_rate: 1.0,
            seed: 3,
            ..Default::default()
        };

        let mut sim = pair(config, sender, receiver);
        for i in 0..30u64 {
            sim.schedule_message(i, b"payload").unwrap();
        }
        sim.run_until_complete();

        let observed = arrivals.borrow();
        assert_eq!(observed.arrivals.len(), 30);
        assert!(observed.arrivals.iter().all(|(_, p)| p.is_corrupted()));
        assert_eq!(sim.corrupted_count, 30);
    }

    #[test]
    fn deterministic_faults_fire_once() {
        let arrivals = Rc::new(RefCell::new(Observed::default()));
        let sender = Probe::new(Rc::new(RefCell::new(Observed::default())));
        let receiver = Probe::new(arrivals.clone());

        let mut sim = pair(SimConfig::default(), sender, receiver);
        sim.add_drop_sender_seq_once(1);
        sim.add_corrupt_sender_seq_once(2);
        for i in 0..4u64 {
            sim.schedule_message(i, b"x").unwrap();
        }
        sim.run_until_complete();

        // The corrupted copy may carry a damaged seq, so only its
        // neighbours are checked by number.
        let observed = arrivals.borrow();
        assert_eq!(observed.arrivals.len(), 3);
        assert_eq!(observed.arrivals[0].1.seq_num, 0);
        assert!(observed.arrivals[1].1.is_corrupted());
        assert_eq!(observed.arrivals[2].1.seq_num, 3);
        assert!(!observed.arrivals[2].1.is_corrupted());
        assert_eq!(sim.lost_count, 1);
        assert_eq!(sim.sender_packet_count, 4);
    }

    #[test]
    fn full_window_parks_messages_in_order() {
        let sender_log = Rc::new(RefCell::new(Observed::default()));
        let mut sender = Probe::new(sender_log);
        sender.capacity = 1;
        let arrivals = Rc::new(RefCell::new(Observed::default()));
        let receiver = Probe::new(arrivals.clone());

        let mut sim = pair(SimConfig::default(), sender, receiver);
        sim.schedule_message(0, b"first").unwrap();
        sim.schedule_message(0, b"second").unwrap();
        sim.schedule_message(0, b"third").unwrap();
        sim.init();
        while sim.step() {}

        assert_eq!(sim.window_full_count, 2);
        assert_eq!(sim.backlog_len(), 2);
        assert_eq!(arrivals.borrow().arrivals.len(), 1);
        assert_eq!(sim.app_messages.len(), 3);
    }
}
