//! Selective-Repeat ARQ endpoints.
//!
//! - [`seq`]: wraparound-aware sequence arithmetic shared by both sides
//! - [`sender`]: send window, one retransmission timer, selective resend
//! - [`receiver`]: out-of-order buffering and in-order delivery
//! - [`builtin`]: name-based lookup used by the harness and CLI
//!
//! Both endpoints are plain state machines driven through
//! [`sr_lab_abstract::TransportProtocol`]; all I/O goes through the
//! [`sr_lab_abstract::SystemContext`] passed to each handler.

pub mod builtin;
pub mod receiver;
pub mod sender;
pub mod seq;

#[cfg(test)]
mod testing;

pub use builtin::{BuiltinProtocol, builtin_by_name, sr_receiver, sr_sender};
pub use receiver::{ReceiverStats, SrReceiver};
pub use sender::{SenderStats, SrSender};
pub use seq::SeqSpace;
