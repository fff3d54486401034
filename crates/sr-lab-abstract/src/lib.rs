pub mod checksum;
pub mod config;
pub mod error;
pub mod interface;
pub mod packet;
pub mod scenario;

pub use interface::{SystemContext, TransportProtocol};
pub use packet::{NOT_IN_USE, PAYLOAD_SIZE, Packet, Payload, WIRE_SIZE, payload_from_bytes};

pub use config::{ArqConfig, SimConfig};
pub use error::{ConfigError, PacketError, SubmitError};
pub use scenario::{SimConfigOverride, TestAction, TestAssertion, TestScenario};
