// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::rc::Rc;

use cxl_components::connect_port;
use cxl_components::sink::Sink;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_engine::traits::Event;
use cxl_models::bridge::config::{BridgeConfig, DEFAULT_RANGE_BASE, OrderingPolicy};
use cxl_models::bridge::ports::{RejectReason, RequestResponder};
use cxl_models::host::requester::Requester;
use cxl_models::protocol::{DeviceResponse, DeviceStatus, S2mOpcode};
use cxl_models::test_helpers::{
    CompletionScript, bridge_with_scripted_device, pattern_data, read_at, write_at,
};
use cxl_models::transaction::{ErrorKind, MemoryRequest, MemoryResponse, ResponseStatus, TransactionId};

fn run_requests(
    config: &BridgeConfig,
    script: CompletionScript,
    requests: Vec<MemoryRequest>,
) -> Vec<(MemoryResponse, u64)> {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let (bridge, _device) = bridge_with_scripted_device(&engine, &clock, config, script).unwrap();
    let requester = Requester::new_and_register(
        &engine,
        &clock,
        engine.top(),
        "host",
        bridge.clone(),
        requests,
        0,
    )
    .unwrap();
    connect_port!(bridge, cpu_side => requester, rx).unwrap();

    run_simulation!(engine);
    assert_eq!(bridge.num_outstanding(), 0);
    requester
        .responses()
        .into_iter()
        .map(|(response, tick)| (response, tick.tick()))
        .collect()
}

fn ids(responses: &[(MemoryResponse, u64)]) -> Vec<TransactionId> {
    responses
        .iter()
        .map(|(response, _)| response.transaction_id)
        .collect()
}

#[test]
fn instant_device_delivers_after_bridge_latency() {
    let responses = run_requests(
        &BridgeConfig::default(),
        CompletionScript::Immediate,
        vec![read_at(1, 0x40)],
    );
    assert_eq!(responses.len(), 1);
    let (response, tick) = &responses[0];
    // 50 ticks to the device then 12 ticks of response processing
    assert_eq!(*tick, 62);
    assert_eq!(response.completion_time.tick(), 62);
    assert_eq!(response.status, ResponseStatus::Ok);
    assert_eq!(
        response.payload,
        Some(pattern_data(read_at(1, 0x40).address, 64))
    );
}

#[test]
fn base_latency_is_a_lower_bound() {
    let config = BridgeConfig {
        response_latency_ticks: 0,
        ..BridgeConfig::default()
    };
    let responses = run_requests(
        &config,
        CompletionScript::Immediate,
        vec![read_at(1, 0), write_at(2, 64, vec![7; 64])],
    );
    assert_eq!(ids(&responses), vec![1, 2]);
    for (_, tick) in &responses {
        assert_eq!(*tick, 50);
    }
    assert_eq!(responses[1].0.payload, None);
}

#[test]
fn device_time_adds_to_bridge_latency() {
    let config = BridgeConfig {
        link_bytes_per_tick: Some(8),
        ..BridgeConfig::default()
    };
    let responses = run_requests(
        &config,
        CompletionScript::Delayed(30),
        vec![read_at(1, 0)],
    );
    // 50 + 64 / 8 to the device, 30 in the device, 12 back
    assert_eq!(responses[0].1, 100);
}

#[test]
fn relaxed_delivers_in_completion_order() {
    let config = BridgeConfig::default();
    let responses = run_requests(
        &config,
        CompletionScript::Order(vec![2, 1]),
        vec![read_at(1, 0), read_at(2, 64)],
    );
    assert_eq!(ids(&responses), vec![2, 1]);
}

#[test]
fn strict_delivers_in_admission_order() {
    let config = BridgeConfig {
        ordering: OrderingPolicy::Strict,
        ..BridgeConfig::default()
    };
    let responses = run_requests(
        &config,
        CompletionScript::Order(vec![2, 1]),
        vec![read_at(1, 0), read_at(2, 64)],
    );
    assert_eq!(ids(&responses), vec![1, 2]);
}

#[test]
fn poisoned_data_is_an_error() {
    let responses = run_requests(
        &BridgeConfig::default(),
        CompletionScript::Poison,
        vec![read_at(1, 0)],
    );
    assert_eq!(
        responses[0].0.status,
        ResponseStatus::Error(ErrorKind::DevicePoison)
    );
    assert_eq!(responses[0].0.payload, None);
}

#[test]
fn every_request_gets_one_response() {
    let config = BridgeConfig {
        max_outstanding: 4,
        ..BridgeConfig::default()
    };
    let requests: Vec<MemoryRequest> = (1..=20).map(|id| read_at(id, id * 64)).collect();
    let responses = run_requests(&config, CompletionScript::Delayed(7), requests);

    let mut seen = ids(&responses);
    seen.sort_unstable();
    assert_eq!(seen, (1..=20).collect::<Vec<_>>());
}

#[test]
fn device_that_never_answers_times_out() {
    let config = BridgeConfig {
        timeout_ticks: 1000,
        ..BridgeConfig::default()
    };
    let responses = run_requests(&config, CompletionScript::Never, vec![read_at(1, 0)]);
    assert_eq!(responses.len(), 1);
    let (response, tick) = &responses[0];
    assert_eq!(response.status, ResponseStatus::Error(ErrorKind::Timeout));
    assert!(*tick >= 1000);
    assert!(response.completion_time.tick() >= 1000);
}

#[test]
fn late_response_is_discarded() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        timeout_ticks: 1000,
        ..BridgeConfig::default()
    };
    let (bridge, device) =
        bridge_with_scripted_device(&engine, &clock, &config, CompletionScript::Delayed(1500))
            .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    {
        let bridge = bridge.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());

            // Timed out but the device still owes a response
            clock.wait_ticks(1200).await;
            assert!(!bridge.has_transaction(1));
            assert_eq!(
                bridge.receive_request(read_at(1, 0)).reason(),
                Some(&RejectReason::DuplicateId)
            );

            // The late response arrives at 50 + 1500
            clock.wait_ticks(400).await;
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());
            Ok(())
        });
    }

    run_simulation!(engine);
    let received: Vec<(ResponseStatus, u64)> = host
        .received()
        .iter()
        .map(|(response, tick)| (response.status, tick.tick()))
        .collect();
    let timeout = ResponseStatus::Error(ErrorKind::Timeout);
    assert_eq!(received, vec![(timeout, 1000), (timeout, 2600)]);
    assert_eq!(device.received().len(), 2);

    let stats = bridge.stats();
    assert!(!bridge.is_faulted());
    assert_eq!(stats.timeouts, 2);
    assert_eq!(stats.late_responses_discarded, 2);
    assert_eq!(stats.protocol_violations, 0);
    assert_eq!(stats.completed_error, 2);
}

#[test]
fn reused_id_is_not_served_by_a_stale_dispatch() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        timeout_ticks: 1000,
        ..BridgeConfig::default()
    };
    let (bridge, device) =
        bridge_with_scripted_device(&engine, &clock, &config, CompletionScript::StallAccept(2000))
            .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    {
        let bridge = bridge.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());
            assert!(bridge.receive_request(read_at(2, 0x40)).is_accepted());

            // Both time out while the device is stalled, 2 before dispatch
            clock.wait_ticks(1100).await;
            assert!(!bridge.has_transaction(2));
            assert!(bridge.receive_request(read_at(2, 0x1000)).is_accepted());
            Ok(())
        });
    }

    run_simulation!(engine);
    let addresses: Vec<(TransactionId, u64)> = device
        .received()
        .iter()
        .map(|(request, _)| (request.transaction_id, request.address - DEFAULT_RANGE_BASE))
        .collect();
    assert_eq!(addresses, vec![(1, 0), (2, 0x1000)]);

    let received = host.received();
    let statuses: Vec<(TransactionId, ResponseStatus, u64)> = received
        .iter()
        .map(|(response, tick)| (response.transaction_id, response.status, tick.tick()))
        .collect();
    let timeout = ResponseStatus::Error(ErrorKind::Timeout);
    assert_eq!(
        statuses,
        vec![(1, timeout, 1000), (2, timeout, 1000), (2, ResponseStatus::Ok, 2012)]
    );
    assert_eq!(
        received[2].0.payload,
        Some(pattern_data(DEFAULT_RANGE_BASE + 0x1000, 64))
    );

    let stats = bridge.stats();
    assert_eq!(stats.dispatched, 2);
    assert_eq!(stats.late_responses_discarded, 1);
    assert_eq!(stats.protocol_violations, 0);
    assert!(!bridge.is_faulted());
}

#[test]
fn strict_refuses_admission_behind_a_blocked_head() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        ordering: OrderingPolicy::Strict,
        timeout_ticks: 1000,
        ..BridgeConfig::default()
    };
    // Transaction 1 is held until 3 arrives
    let (bridge, _device) = bridge_with_scripted_device(
        &engine,
        &clock,
        &config,
        CompletionScript::Order(vec![2, 3, 1]),
    )
    .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    {
        let bridge = bridge.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());
            assert!(bridge.receive_request(read_at(2, 64)).is_accepted());

            // 2 has completed but 1 has not
            clock.wait_ticks(60).await;
            let third = read_at(3, 128);
            assert_eq!(
                bridge.receive_request(third.clone()).reason(),
                Some(&RejectReason::Busy)
            );

            // 1 times out which unblocks delivery
            bridge.retry_event().listen().await;
            assert_eq!(clock.tick_now().tick(), 1000);
            assert!(bridge.receive_request(third).is_accepted());
            Ok(())
        });
    }

    run_simulation!(engine);
    let received: Vec<(TransactionId, ResponseStatus, u64)> = host
        .received()
        .iter()
        .map(|(response, tick)| (response.transaction_id, response.status, tick.tick()))
        .collect();
    assert_eq!(
        received,
        vec![
            (1, ResponseStatus::Error(ErrorKind::Timeout), 1000),
            (2, ResponseStatus::Ok, 1000),
            (3, ResponseStatus::Ok, 1062),
        ]
    );
    assert_eq!(bridge.stats().late_responses_discarded, 1);
}

#[test]
fn unknown_response_faults_until_reset() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let (bridge, device) = bridge_with_scripted_device(
        &engine,
        &clock,
        &BridgeConfig::default(),
        CompletionScript::Immediate,
    )
    .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    {
        let bridge = bridge.clone();
        let device = device.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            clock.wait_ticks(10).await;
            device.send_unsolicited(DeviceResponse {
                transaction_id: 99,
                opcode: S2mOpcode::Cmp,
                payload: None,
                status: DeviceStatus::Ok,
            })?;
            clock.wait_ticks(1).await;

            assert!(bridge.is_faulted());
            assert_eq!(
                bridge.receive_request(read_at(1, 0)).reason(),
                Some(&RejectReason::Faulted)
            );

            bridge.reset()?;
            assert!(!bridge.is_faulted());
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(host.num_sunk(), 1);
    assert_eq!(host.received()[0].1.tick(), 73);

    let stats = bridge.stats();
    assert_eq!(stats.protocol_violations, 1);
    assert_eq!(stats.rejected_faulted, 1);
    assert_eq!(stats.completed_ok, 1);
}

#[test]
fn requester_retries_after_busy() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        max_outstanding: 1,
        ..BridgeConfig::default()
    };
    let (bridge, _device) =
        bridge_with_scripted_device(&engine, &clock, &config, CompletionScript::Immediate)
            .unwrap();
    let requests = vec![read_at(1, 0), read_at(2, 64), read_at(3, 128)];
    let requester =
        Requester::new_and_register(&engine, &clock, engine.top(), "host", bridge.clone(), requests, 0)
            .unwrap();
    connect_port!(bridge, cpu_side => requester, rx).unwrap();

    run_simulation!(engine);
    let ticks: Vec<u64> = requester
        .responses()
        .iter()
        .map(|(_, tick)| tick.tick())
        .collect();
    assert_eq!(ticks, vec![62, 124, 186]);
    assert_eq!(requester.num_accepted(), 3);
    assert!(requester.rejected().is_empty());
    assert_eq!(bridge.stats().rejected_busy, 2);
}

#[test]
fn requester_records_permanent_rejections() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let (bridge, _device) = bridge_with_scripted_device(
        &engine,
        &clock,
        &BridgeConfig::default(),
        CompletionScript::Immediate,
    )
    .unwrap();
    let requests = vec![MemoryRequest::read(1, 0, 64), read_at(2, 0)];
    let requester = Requester::new_and_register(
        &engine,
        &clock,
        engine.top(),
        "host",
        bridge.clone() as Rc<dyn RequestResponder>,
        requests,
        5,
    )
    .unwrap();
    connect_port!(bridge, cpu_side => requester, rx).unwrap();

    run_simulation!(engine);
    let rejected = requester.rejected();
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].0.transaction_id, 1);
    assert_eq!(rejected[0].1, RejectReason::OutOfRange);
    assert_eq!(requester.num_responses(), 1);
    // Issued after the 5 tick gap
    assert_eq!(requester.responses()[0].1.tick(), 67);
}
