use anyhow::{Context, Result};
use sr_lab_abstract::{
    ArqConfig, SimConfig, TestAction, TestAssertion, TestScenario, TransportProtocol,
    payload_from_bytes,
};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::engine::Simulator;
use crate::trace::SimulationReport;

pub fn load_scenario(path: &Path) -> Result<TestScenario> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
    parse_scenario(&content)
}

pub fn parse_scenario(content: &str) -> Result<TestScenario> {
    let scenario: TestScenario = toml::from_str(content).context("Failed to parse scenario file")?;
    scenario
        .protocol
        .validate()
        .with_context(|| format!("Scenario '{}' has invalid protocol constants", scenario.name))?;
    Ok(scenario)
}

/// Load a scenario from disk, run it and check its assertions.
pub fn run_scenario(
    path: &Path,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> Result<SimulationReport> {
    let scenario = load_scenario(path)?;
    run(&scenario, sender, receiver)
}

pub fn run(
    scenario: &TestScenario,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> Result<SimulationReport> {
    info!("Running scenario '{}': {}", scenario.name, scenario.description);
    let mut sim = build_simulator(scenario, sender, receiver)?;
    sim.run_until_complete();
    let report = sim.export_report();

    let failures = check_assertions(&report, &scenario.assertions)?;
    if !failures.is_empty() {
        anyhow::bail!(
            "Scenario '{}' failed:\n  - {}",
            scenario.name,
            failures.join("\n  - ")
        );
    }
    info!("Scenario '{}' passed", scenario.name);
    Ok(report)
}

pub fn build_simulator(
    scenario: &TestScenario,
    sender: Box<dyn TransportProtocol>,
    receiver: Box<dyn TransportProtocol>,
) -> Result<Simulator> {
    let mut config = SimConfig::default();
    scenario.config.apply_to(&mut config);
    warn_on_stale_redelivery(&config, &scenario.protocol);
    let mut sim = Simulator::new(config, sender, receiver);
    configure_actions(&mut sim, &scenario.actions)?;
    Ok(sim)
}

/// Warn when a resent copy of an already delivered packet can reach a
/// receiver whose window has wrapped back onto its number. Returns whether
/// the warning fired.
pub fn warn_on_stale_redelivery(channel: &SimConfig, protocol: &ArqConfig) -> bool {
    let risky = protocol.may_alias() && protocol.may_time_out_early(channel);
    if risky {
        warn!(
            round_trip = channel.round_trip_bound(),
            rtt = protocol.rtt,
            window_size = protocol.window_size,
            seq_space = protocol.seq_space,
            "round trip can outlast the timer and the sequence space is below twice the window; \
             stale retransmissions may be delivered as new data"
        );
    }
    risky
}

pub fn configure_actions(sim: &mut Simulator, actions: &[TestAction]) -> Result<()> {
    for action in actions {
        match action {
            TestAction::AppSend { time, data } => {
                sim.schedule_message(*time, data.as_bytes())
                    .with_context(|| format!("Invalid app_send payload '{data}'"))?;
            }
            TestAction::DropNextFromSenderSeq { seq } => {
                sim.add_drop_sender_seq_once(*seq);
            }
            TestAction::CorruptNextFromSenderSeq { seq } => {
                sim.add_corrupt_sender_seq_once(*seq);
            }
            TestAction::DropNextFromReceiverAck { ack } => {
                sim.add_drop_receiver_ack_once(*ack);
            }
        }
    }
    Ok(())
}

/// Evaluate every assertion and describe the ones that do not hold.
pub fn check_assertions(
    report: &SimulationReport,
    assertions: &[TestAssertion],
) -> Result<Vec<String>> {
    let mut failures = Vec::new();
    for assertion in assertions {
        match assertion {
            TestAssertion::DataDelivered { data } => {
                let payload = payload_from_bytes(data.as_bytes())
                    .with_context(|| format!("Invalid data_delivered payload '{data}'"))?;
                if !report.delivered_data.contains(&payload) {
                    failures.push(format!("'{data}' was never delivered"));
                }
            }
            TestAssertion::AllDeliveredInOrder => {
                if !report.delivered_in_order() {
                    failures.push(format!(
                        "{} messages submitted but delivery was {} payloads, not the same sequence",
                        report.app_messages.len(),
                        report.delivered_data.len()
                    ));
                }
            }
            TestAssertion::SenderPacketCount { min, max } => {
                check_range(
                    &mut failures,
                    "sender packet count",
                    report.sender_packet_count,
                    *min,
                    *max,
                );
            }
            TestAssertion::Retransmissions { min, max } => {
                check_range(
                    &mut failures,
                    "retransmissions",
                    report.retransmissions() as u32,
                    *min,
                    *max,
                );
            }
            TestAssertion::SenderWindowMax { min, max } => match report.max_window() {
                Some(observed) => {
                    check_range(&mut failures, "maximum window", observed, *min, *max)
                }
                None => failures.push("sender never reported its window".to_string()),
            },
            TestAssertion::MaxDuration { ticks } => {
                if report.duration > *ticks {
                    failures.push(format!(
                        "run took {} ticks, limit is {}",
                        report.duration, ticks
                    ));
                }
            }
        }
    }
    Ok(failures)
}

fn check_range(failures: &mut Vec<String>, what: &str, observed: u32, min: u32, max: Option<u32>) {
    if observed < min {
        failures.push(format!("{what} {observed} is below minimum {min}"));
    }
    if let Some(max) = max
        && observed > max
    {
        failures.push(format!("{what} {observed} exceeds maximum {max}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
name = "parse"
description = "parsing check"

[config]
loss_rate = 0.0
seed = 11

[protocol]
window_size = 4
seq_space = 8

[[actions]]
type = "app_send"
time = 0
data = "hello"

[[actions]]
type = "drop_next_from_sender_seq"
seq = 0

[[assertions]]
type = "all_delivered_in_order"

[[assertions]]
type = "max_duration"
ticks = 100
"#;

    #[test]
    fn parses_tagged_actions_and_protocol_table() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        assert_eq!(scenario.protocol.window_size, 4);
        assert_eq!(scenario.protocol.rtt, 16);
        assert_eq!(scenario.actions.len(), 2);
        assert!(matches!(
            scenario.assertions[0],
            TestAssertion::AllDeliveredInOrder
        ));
    }

    #[test]
    fn rejects_invalid_protocol_constants() {
        let bad = SCENARIO.replace("seq_space = 8", "seq_space = 4");
        assert!(parse_scenario(&bad).is_err());
    }

    #[test]
    fn flags_slow_channel_only_with_aliasing_sequence_space() {
        let slow = SimConfig {
            max_latency: 9,
            ..Default::default()
        };
        let defaults = ArqConfig::default();
        assert!(warn_on_stale_redelivery(&slow, &defaults));
        assert!(!warn_on_stale_redelivery(&SimConfig::default(), &defaults));
        assert!(!warn_on_stale_redelivery(&slow, &defaults.with_seq_space(12)));
    }

    #[test]
    fn range_checks_report_both_bounds() {
        let mut failures = Vec::new();
        check_range(&mut failures, "x", 5, 6, Some(4));
        assert_eq!(failures.len(), 2);
        failures.clear();
        check_range(&mut failures, "x", 5, 0, None);
        assert!(failures.is_empty());
    }
}
