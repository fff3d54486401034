use std::path::PathBuf;

use sr_lab_protocol::{sr_receiver, sr_sender};
use sr_lab_simulator::scenario_runner::{load_scenario, run};

fn scenario_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../scenarios")
}

fn run_file(name: &str) {
    let path = scenario_dir().join(name);
    let scenario = load_scenario(&path).unwrap();
    let sender = sr_sender(scenario.protocol).unwrap();
    let receiver = sr_receiver(scenario.protocol).unwrap();
    let report = run(&scenario, sender, receiver).unwrap_or_else(|err| panic!("{err:#}"));
    assert!(report.delivered_in_order());
}

#[test]
fn basic_in_order() {
    run_file("basic_in_order.toml");
}

#[test]
fn lost_data_packet() {
    run_file("lost_data_packet.toml");
}

#[test]
fn lost_ack() {
    run_file("lost_ack.toml");
}

#[test]
fn out_of_order_buffering() {
    run_file("out_of_order_buffering.toml");
}

#[test]
fn window_full() {
    run_file("window_full.toml");
}

#[test]
fn lossy_channel() {
    run_file("lossy_channel.toml");
}

#[test]
fn every_shipped_scenario_parses() {
    let mut count = 0;
    for entry in std::fs::read_dir(scenario_dir()).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "toml") {
            load_scenario(&path).unwrap_or_else(|err| panic!("{}: {err:#}", path.display()));
            count += 1;
        }
    }
    assert!(count >= 6);
}

#[test]
fn failing_assertion_is_reported() {
    let scenario = sr_lab_simulator::scenario_runner::parse_scenario(
        r#"
name = "impossible"
description = "expects a retransmission on a clean channel"

[config]
min_latency = 5
max_latency = 5

[[actions]]
type = "app_send"
time = 0
data = "hi"

[[assertions]]
type = "retransmissions"
min = 1
"#,
    )
    .unwrap();
    let sender = sr_sender(scenario.protocol).unwrap();
    let receiver = sr_receiver(scenario.protocol).unwrap();

    let err = run(&scenario, sender, receiver).unwrap_err();
    assert!(err.to_string().contains("retransmissions 0 is below minimum 1"));
}
