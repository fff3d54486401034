//! Selective-Repeat send side.
//!
//! [`SrSender`] keeps up to `window_size` packets in flight. Every packet is
//! acknowledged individually; the window slides over the longest acknowledged
//! prefix. A single timer always guards the oldest unacknowledged packet, and
//! a timeout retransmits that packet alone.
//!
//! ```text
//!  window_base                   next_seq
//!      │ acked? ✗   ✓   ✗   ✓       │
//!  ────┼───────────────────────────┼──────────▶ seq space (mod seq_space)
//!      │ <── window_count ───────▶ │
//! ```

use sr_lab_abstract::{
    ArqConfig, ConfigError, Packet, Payload, SubmitError, SystemContext, TransportProtocol,
};
use tracing::warn;

use crate::seq::SeqSpace;

/// Counters kept by the sender for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    /// Messages accepted into the window.
    pub submitted: u64,
    /// Submissions rejected because the window was full.
    pub window_full: u64,
    /// Uncorrupted acknowledgments received.
    pub acks_received: u64,
    /// Acknowledgments that marked a packet for the first time.
    pub new_acks: u64,
    /// Acknowledgments for packets already marked.
    pub duplicate_acks: u64,
    /// Acknowledgments for numbers outside the current window.
    pub stale_acks: u64,
    /// Acknowledgments dropped on checksum mismatch.
    pub corrupted_acks: u64,
    pub retransmissions: u64,
}

#[derive(Debug, Clone)]
struct Slot {
    packet: Packet,
    acked: bool,
}

/// Send-side state for one connection.
#[derive(Debug)]
pub struct SrSender {
    config: ArqConfig,
    space: SeqSpace,

    /// Sequence number to use for the next new packet.
    next_seq: u32,
    /// Oldest sequence number still in the window.
    window_base: u32,
    /// Packets currently in the window.
    window_count: u32,

    /// Physical slot holding `window_base`. Slots follow the window in order,
    /// so `window_size` consecutive numbers never share one.
    first_slot: usize,
    slots: Vec<Option<Slot>>,

    /// Indexed by sequence number.
    in_window: Vec<bool>,

    /// Sequence number the running timer guards; `None` when disarmed.
    oldest_unacked: Option<u32>,

    stats: SenderStats,
}

impl SrSender {
    pub fn new(config: ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.may_alias() {
            warn!(
                window_size = config.window_size,
                seq_space = config.seq_space,
                "sequence space below twice the window; lost acks can alias old and new packets"
            );
        }
        Ok(Self {
            config,
            space: SeqSpace::new(config.seq_space),
            next_seq: 0,
            window_base: 0,
            window_count: 0,
            first_slot: 0,
            slots: vec![None; config.window_size as usize],
            in_window: vec![false; config.seq_space as usize],
            oldest_unacked: None,
            stats: SenderStats::default(),
        })
    }

    /// Forget every packet and start numbering from zero again. A running
    /// timer is stopped so the next submission can arm it afresh.
    pub fn reset(&mut self, ctx: &mut dyn SystemContext) {
        if self.oldest_unacked.is_some() {
            ctx.stop_timer();
        }
        self.next_seq = 0;
        self.window_base = 0;
        self.window_count = 0;
        self.first_slot = 0;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.in_window.iter_mut().for_each(|flag| *flag = false);
        self.oldest_unacked = None;
        self.stats = SenderStats::default();
    }

    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    pub fn window_base(&self) -> u32 {
        self.window_base
    }

    pub fn window_count(&self) -> u32 {
        self.window_count
    }

    /// Sequence number currently guarded by the timer.
    pub fn timed_seq(&self) -> Option<u32> {
        self.oldest_unacked
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Acknowledgment state of `seq`, or `None` when it is not in the window.
    pub fn is_acked(&self, seq: u32) -> Option<bool> {
        if !self.space.contains(self.window_base, self.window_count, seq) {
            return None;
        }
        self.slots[self.slot_index(seq)]
            .as_ref()
            .map(|slot| slot.acked)
    }

    /// Accept one application message, returning the sequence number it was
    /// sent under. A full window is reported back without touching any state
    /// except the rejection counter.
    pub fn submit(
        &mut self,
        ctx: &mut dyn SystemContext,
        payload: Payload,
    ) -> Result<u32, SubmitError> {
        if self.window_count == self.config.window_size {
            self.stats.window_full += 1;
            ctx.log("new message arrives, send window is full");
            return Err(SubmitError::WindowFull {
                in_flight: self.window_count,
            });
        }

        let seq = self.next_seq;
        let packet = Packet::data(seq, payload);
        let index = self.slot_index(seq);
        self.slots[index] = Some(Slot {
            packet: packet.clone(),
            acked: false,
        });
        self.in_window[seq as usize] = true;

        ctx.log(&format!("sending packet {seq}"));
        ctx.send_packet(packet);

        if self.oldest_unacked.is_none() {
            ctx.start_timer(self.config.rtt);
            self.oldest_unacked = Some(seq);
        }

        self.next_seq = self.space.next(seq);
        self.window_count += 1;
        self.stats.submitted += 1;
        ctx.record_metric("window_count", self.window_count as f64);
        Ok(seq)
    }

    /// Handle an acknowledgment arriving from the receiver.
    pub fn on_ack(&mut self, ctx: &mut dyn SystemContext, packet: &Packet) {
        if packet.is_corrupted() {
            self.stats.corrupted_acks += 1;
            ctx.log("corrupted ACK received, do nothing");
            return;
        }
        self.stats.acks_received += 1;

        let Some(ack) = packet.ack_num else {
            self.stats.stale_acks += 1;
            ctx.log(&format!("packet {} carries no ACK, ignored", packet.seq_num));
            return;
        };

        if !self
            .space
            .contains(self.window_base, self.window_count, ack)
        {
            self.stats.stale_acks += 1;
            ctx.log(&format!("ACK {ack} is outside the window, ignored"));
            return;
        }

        let index = self.slot_index(ack);
        let Some(slot) = self.slots[index].as_mut() else {
            return;
        };
        if slot.acked {
            self.stats.duplicate_acks += 1;
            ctx.log(&format!("duplicate ACK {ack}, do nothing"));
            return;
        }

        slot.acked = true;
        self.stats.new_acks += 1;
        ctx.log(&format!("ACK {ack} is not a duplicate"));

        if self.oldest_unacked == Some(ack) {
            ctx.stop_timer();
            self.oldest_unacked = None;
            self.arm_on_first_unacked(ctx);
        }

        self.slide(ctx);
    }

    /// Handle expiry of the retransmission timer.
    pub fn on_timeout(&mut self, ctx: &mut dyn SystemContext) {
        let Some(seq) = self.oldest_unacked else {
            ctx.log("timeout with nothing outstanding");
            return;
        };

        let pending = self.in_window[seq as usize]
            .then(|| self.slots[self.slot_index(seq)].as_ref())
            .flatten()
            .filter(|slot| !slot.acked && slot.packet.seq_num == seq)
            .map(|slot| slot.packet.clone());

        match pending {
            Some(packet) => {
                ctx.log(&format!("timeout, resending packet {seq}"));
                ctx.send_packet(packet);
                ctx.start_timer(self.config.rtt);
                self.stats.retransmissions += 1;
                ctx.record_metric("retransmit", seq as f64);
            }
            None => {
                // Acknowledged after the timer had already fired.
                ctx.log(&format!("timeout for acknowledged packet {seq}, retargeting"));
                self.oldest_unacked = None;
                self.arm_on_first_unacked(ctx);
            }
        }
    }

    fn slot_index(&self, seq: u32) -> usize {
        let offset = self.space.distance(self.window_base, seq) as usize;
        (self.first_slot + offset) % self.slots.len()
    }

    /// Point the (disarmed) timer at the first unacknowledged packet, scanning
    /// forward from the window base.
    fn arm_on_first_unacked(&mut self, ctx: &mut dyn SystemContext) {
        let next = (0..self.window_count)
            .map(|offset| self.space.add(self.window_base, offset))
            .find(|&seq| {
                self.slots[self.slot_index(seq)]
                    .as_ref()
                    .is_some_and(|slot| !slot.acked)
            });

        if let Some(seq) = next {
            ctx.start_timer(self.config.rtt);
            self.oldest_unacked = Some(seq);
        }
    }

    /// Retire the acknowledged prefix of the window.
    fn slide(&mut self, ctx: &mut dyn SystemContext) {
        let before = self.window_count;
        while self.window_count > 0 {
            let base = self.window_base;
            let acked = self.slots[self.first_slot]
                .as_ref()
                .is_some_and(|slot| slot.acked);
            if !acked || !self.in_window[base as usize] {
                break;
            }
            self.slots[self.first_slot] = None;
            self.in_window[base as usize] = false;
            self.window_base = self.space.next(base);
            self.first_slot = (self.first_slot + 1) % self.slots.len();
            self.window_count -= 1;
        }
        if self.window_count != before {
            ctx.log(&format!(
                "window slides to base {} ({} in flight)",
                self.window_base, self.window_count
            ));
            ctx.record_metric("window_count", self.window_count as f64);
        }
    }
}

impl TransportProtocol for SrSender {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset(ctx);
        ctx.log("SR sender ready");
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_ack(ctx, &packet);
    }

    fn on_timer(&mut self, ctx: &mut dyn SystemContext) {
        self.on_timeout(ctx);
    }

    fn on_app_data(
        &mut self,
        ctx: &mut dyn SystemContext,
        payload: Payload,
    ) -> Result<(), SubmitError> {
        self.submit(ctx, payload).map(|_| ())
    }
}
