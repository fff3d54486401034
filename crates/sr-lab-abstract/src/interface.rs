use crate::error::SubmitError;
use crate::packet::{Packet, Payload};

/// The capabilities the harness hands to an endpoint while it handles one event.
pub trait SystemContext {
    /// Send a packet into the unreliable channel.
    fn send_packet(&mut self, packet: Packet);

    /// Arm this endpoint's single timer for `delay` ticks.
    /// Arming an already-armed timer is a contract violation.
    fn start_timer(&mut self, delay: u64);

    /// Disarm the timer.
    fn stop_timer(&mut self);

    /// Hand an in-order payload to the application layer.
    fn deliver_data(&mut self, payload: &Payload);

    /// Log a message to the harness's debug output.
    fn log(&mut self, message: &str);

    /// Current simulation time in ticks.
    fn now(&self) -> u64;

    /// Record a numeric sample such as window occupancy. Harnesses that do
    /// not chart anything can leave this as the no-op default.
    fn record_metric(&mut self, _name: &str, _value: f64) {}
}

/// One endpoint of the protocol, driven one event at a time.
pub trait TransportProtocol {
    /// Called once before any other event.
    fn init(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when a packet arrives from the channel.
    fn on_packet(&mut self, ctx: &mut dyn SystemContext, packet: Packet);

    /// Called when the endpoint's timer expires.
    fn on_timer(&mut self, _ctx: &mut dyn SystemContext) {}

    /// Called when the application wants `payload` delivered reliably.
    fn on_app_data(
        &mut self,
        _ctx: &mut dyn SystemContext,
        _payload: Payload,
    ) -> Result<(), SubmitError> {
        Err(SubmitError::ReceiveOnly)
    }
}
