//! Selective-Repeat receive side.
//!
//! Buffers any intact packet inside `[window_base, window_base + window_size)`
//! and hands payloads to the application strictly in sequence order. Every
//! intact arrival is acknowledged individually, including ones below the
//! window, so a sender stuck on a stale copy still hears back.

use sr_lab_abstract::{ArqConfig, ConfigError, Packet, SystemContext, TransportProtocol};

use crate::seq::SeqSpace;

/// Counters kept by the receiver for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStats {
    /// Intact in-window packets stored for the first time.
    pub packets_buffered: u64,
    /// Payloads handed to the application.
    pub delivered: u64,
    /// Copies of packets already buffered or already delivered.
    pub duplicates: u64,
    /// Intact packets outside the window that were never delivered here.
    pub out_of_window: u64,
    /// Packets dropped on checksum mismatch.
    pub corrupted: u64,
    pub acks_sent: u64,
}

#[derive(Debug)]
pub struct SrReceiver {
    config: ArqConfig,
    space: SeqSpace,

    window_base: u32,
    /// Physical slot holding `window_base`.
    base_slot: usize,
    /// `Some` once the packet for that position has arrived.
    slots: Vec<Option<Packet>>,

    /// Indexed by sequence number: delivered, and the number has not yet
    /// come back around into the receive window.
    delivered: Vec<bool>,

    /// Alternating sequence bit stamped on outgoing acks.
    ack_seq: u32,

    stats: ReceiverStats,
}

impl SrReceiver {
    pub fn new(config: ArqConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            space: SeqSpace::new(config.seq_space),
            window_base: 0,
            base_slot: 0,
            slots: vec![None; config.window_size as usize],
            delivered: vec![false; config.seq_space as usize],
            ack_seq: 1,
            stats: ReceiverStats::default(),
        })
    }

    pub fn reset(&mut self) {
        self.window_base = 0;
        self.base_slot = 0;
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.delivered.iter_mut().for_each(|flag| *flag = false);
        self.ack_seq = 1;
        self.stats = ReceiverStats::default();
    }

    pub fn config(&self) -> &ArqConfig {
        &self.config
    }

    pub fn window_base(&self) -> u32 {
        self.window_base
    }

    pub fn stats(&self) -> ReceiverStats {
        self.stats
    }

    /// Whether `seq` sits in the buffer waiting for a gap to fill.
    pub fn is_buffered(&self, seq: u32) -> bool {
        self.in_window(seq) && self.slots[self.slot_index(seq)].is_some()
    }

    /// Number of packets held out of order.
    pub fn buffered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Handle a data packet arriving from the sender.
    pub fn on_data(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        if packet.is_corrupted() {
            self.stats.corrupted += 1;
            ctx.log("corrupted packet received, no ACK");
            return;
        }

        let seq = packet.seq_num;
        if self.in_window(seq) {
            let index = self.slot_index(seq);
            if self.delivered[seq as usize] || self.slots[index].is_some() {
                self.stats.duplicates += 1;
                ctx.log(&format!("packet {seq} already received"));
            } else {
                ctx.log(&format!("packet {seq} is correctly received, buffering"));
                self.slots[index] = Some(packet);
                self.stats.packets_buffered += 1;
                if seq == self.window_base {
                    self.deliver_in_order(ctx);
                }
            }
        } else if self.delivered.get(seq as usize).copied().unwrap_or(false) {
            self.stats.duplicates += 1;
            ctx.log(&format!("packet {seq} already delivered, re-ACK"));
        } else {
            self.stats.out_of_window += 1;
            ctx.log(&format!("packet {seq} outside receive window, ACK anyway"));
        }

        self.send_ack(ctx, seq);
    }

    fn in_window(&self, seq: u32) -> bool {
        self.space
            .contains(self.window_base, self.config.window_size, seq)
    }

    fn slot_index(&self, seq: u32) -> usize {
        let offset = self.space.distance(self.window_base, seq) as usize;
        (self.base_slot + offset) % self.slots.len()
    }

    /// Deliver the base packet and every buffered packet that directly
    /// follows it.
    fn deliver_in_order(&mut self, ctx: &mut dyn SystemContext) {
        while let Some(packet) = self.slots[self.base_slot].take() {
            let seq = self.window_base;
            ctx.log(&format!("delivering packet {seq}"));
            ctx.deliver_data(&packet.payload);
            self.stats.delivered += 1;
            self.delivered[seq as usize] = true;

            self.window_base = self.space.next(seq);
            self.base_slot = (self.base_slot + 1) % self.slots.len();

            // The number entering at the top of the window is reusable again.
            let entering = self
                .space
                .add(self.window_base, self.config.window_size - 1);
            self.delivered[entering as usize] = false;
        }
    }

    fn send_ack(&mut self, ctx: &mut dyn SystemContext, seq: u32) {
        let ack = Packet::ack(self.ack_seq, seq);
        self.ack_seq ^= 1;
        ctx.send_packet(ack);
        self.stats.acks_sent += 1;
    }
}

impl TransportProtocol for SrReceiver {
    fn init(&mut self, ctx: &mut dyn SystemContext) {
        self.reset();
        ctx.log("SR receiver ready");
    }

    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet) {
        self.on_data(ctx, packet);
    }
}
