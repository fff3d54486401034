use thiserror::Error;

/// Rejected protocol constants.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("window size must be at least 1")]
    EmptyWindow,
    #[error("sequence space {seq_space} must be at least window size {window_size} + 1")]
    SequenceSpaceTooSmall { window_size: u32, seq_space: u32 },
    #[error("retransmission timeout must be greater than zero")]
    ZeroTimeout,
}

/// Failures building or decoding packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("payload of {0} bytes exceeds the fixed {1}-byte block")]
    PayloadTooLarge(usize, usize),
    #[error("frame of {0} bytes is shorter than the {1}-byte wire format")]
    Truncated(usize, usize),
}

/// Synchronous rejection of an outbound message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// Every window slot is occupied; the caller decides whether to retry.
    #[error("send window is full ({in_flight} packets awaiting acknowledgment)")]
    WindowFull { in_flight: u32 },
    #[error("endpoint only receives data")]
    ReceiveOnly,
}
