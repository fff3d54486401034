use anyhow::{Context, Result};
use sr_lab_abstract::{ArqConfig, TransportProtocol};

use crate::{SrReceiver, SrSender};

/// Built-in Rust endpoints that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinProtocol {
    SrSender,
    SrReceiver,
}

impl BuiltinProtocol {
    pub fn instantiate(self, config: ArqConfig) -> Result<Box<dyn TransportProtocol>> {
        let protocol: Box<dyn TransportProtocol> = match self {
            BuiltinProtocol::SrSender => Box::new(
                SrSender::new(config).context("Invalid protocol constants for SR sender")?,
            ),
            BuiltinProtocol::SrReceiver => Box::new(
                SrReceiver::new(config).context("Invalid protocol constants for SR receiver")?,
            ),
        };
        Ok(protocol)
    }
}

/// Map a user-visible builtin name to the enum used by the harness.
pub fn builtin_by_name(name: &str, is_sender: bool) -> Result<BuiltinProtocol> {
    match name {
        "sr" | "selective-repeat" => Ok(if is_sender {
            BuiltinProtocol::SrSender
        } else {
            BuiltinProtocol::SrReceiver
        }),
        other => anyhow::bail!("Unknown builtin '{other}'. Try 'sr'."),
    }
}

pub fn sr_sender(config: ArqConfig) -> Result<Box<dyn TransportProtocol>> {
    BuiltinProtocol::SrSender.instantiate(config)
}

pub fn sr_receiver(config: ArqConfig) -> Result<Box<dyn TransportProtocol>> {
    BuiltinProtocol::SrReceiver.instantiate(config)
}
