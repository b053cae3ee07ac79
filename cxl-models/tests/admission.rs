// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use cxl_components::connect_port;
use cxl_components::sink::Sink;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;
use cxl_engine::traits::Event;
use cxl_models::bridge::CxlBridge;
use cxl_models::bridge::config::{BridgeConfig, DEFAULT_RANGE_BASE, DEFAULT_RANGE_SIZE};
use cxl_models::bridge::ports::{Admission, RejectReason, RequestResponder};
use cxl_models::bridge::translate::TranslateError;
use cxl_models::test_helpers::{CompletionScript, bridge_with_scripted_device, read_at};
use cxl_models::transaction::{MemoryRequest, MemoryResponse, Operation};

#[test]
fn out_of_range_is_rejected_without_an_entry() {
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

    let below = MemoryRequest::read(1, DEFAULT_RANGE_BASE - 64, 64);
    let admission = bridge.receive_request(below.clone());
    assert_eq!(
        admission,
        Admission::Rejected {
            reason: RejectReason::OutOfRange,
            request: below.clone()
        }
    );
    assert!(!bridge.has_transaction(1));

    // The same request is rejected the same way again
    assert_eq!(bridge.receive_request(below), admission);

    let straddling = read_at(2, DEFAULT_RANGE_SIZE - 32);
    assert_eq!(
        bridge.receive_request(straddling).reason(),
        Some(&RejectReason::OutOfRange)
    );
    assert_eq!(bridge.num_outstanding(), 0);

    run_simulation!(engine);
    assert_eq!(host.num_sunk(), 0);
    assert!(device.received().is_empty());
    assert_eq!(bridge.stats().rejected_out_of_range, 3);
    assert_eq!(bridge.stats().accepted, 0);
}

#[test]
fn untranslatable_requests_are_rejected() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let (bridge, _device) = bridge_with_scripted_device(
        &engine,
        &clock,
        &BridgeConfig::default(),
        CompletionScript::Immediate,
    )
    .unwrap();

    let invalidate = read_at(1, 0).with_operation(Operation::Invalidate);
    assert_eq!(
        bridge.receive_request(invalidate.clone()),
        Admission::Rejected {
            reason: RejectReason::Unsupported(TranslateError::UnsupportedOperation(
                Operation::Invalidate
            )),
            request: invalidate
        }
    );

    let too_big = MemoryRequest::read(2, DEFAULT_RANGE_BASE, 128);
    assert_eq!(
        bridge.receive_request(too_big).reason(),
        Some(&RejectReason::Unsupported(TranslateError::TooLarge {
            size: 128
        }))
    );
    assert_eq!(bridge.num_outstanding(), 0);

    run_simulation!(engine);
    assert_eq!(bridge.stats().rejected_unsupported, 2);
    assert_eq!(bridge.stats().dispatched, 0);
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let (bridge, _device) = bridge_with_scripted_device(
        &engine,
        &clock,
        &BridgeConfig::default(),
        CompletionScript::Immediate,
    )
    .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    assert!(bridge.receive_request(read_at(5, 0)).is_accepted());
    assert_eq!(
        bridge.receive_request(read_at(5, 64)).reason(),
        Some(&RejectReason::DuplicateId)
    );

    run_simulation!(engine);
    assert_eq!(host.num_sunk(), 1);
    assert_eq!(bridge.stats().rejected_duplicate, 1);
}

#[test]
fn full_tracker_admits_one_per_completion() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        max_outstanding: 2,
        ..BridgeConfig::default()
    };
    let (bridge, _device) =
        bridge_with_scripted_device(&engine, &clock, &config, CompletionScript::Immediate)
            .unwrap();
    let host = Sink::<MemoryResponse>::new_and_register(&engine, &clock, engine.top(), "host").unwrap();
    connect_port!(bridge, cpu_side => host, rx).unwrap();

    {
        let bridge = bridge.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            assert!(bridge.receive_request(read_at(1, 0)).is_accepted());
            assert!(bridge.receive_request(read_at(2, 64)).is_accepted());

            let third = read_at(3, 128);
            assert_eq!(
                bridge.receive_request(third.clone()),
                Admission::Rejected {
                    reason: RejectReason::Busy,
                    request: third.clone()
                }
            );

            // First delivery: 50 ticks to the device and 12 back
            bridge.retry_event().listen().await;
            assert_eq!(clock.tick_now().tick(), 62);
            assert!(bridge.receive_request(third).is_accepted());
            assert_eq!(
                bridge.receive_request(read_at(4, 192)).reason(),
                Some(&RejectReason::Busy)
            );
            Ok(())
        });
    }

    run_simulation!(engine);
    let ids: Vec<u64> = host
        .received()
        .iter()
        .map(|(response, _)| response.transaction_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let stats = bridge.stats();
    assert_eq!(stats.accepted, 3);
    assert_eq!(stats.rejected_busy, 2);
    assert_eq!(stats.queue_full_events, 2);
    assert_eq!(stats.occupancy.max(), Some(2));
    assert_eq!(bridge.num_outstanding(), 0);
}

#[test]
fn invalid_config_is_refused() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        range_size: 0,
        ..BridgeConfig::default()
    };
    let result = CxlBridge::new_and_register(&engine, &clock, engine.top(), "bridge", &config);
    match result {
        Ok(_) => panic!("Expected an error!"),
        Err(e) => assert_eq!(format!("{e}"), "Error: address range must not be empty"),
    }

    run_simulation!(engine);
}

#[test]
fn bridges_are_independent() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let config = BridgeConfig {
        max_outstanding: 1,
        ..BridgeConfig::default()
    };
    let top = engine.top().clone();
    let bridge_a = CxlBridge::new_and_register(&engine, &clock, &top, "bridge_a", &config).unwrap();
    let bridge_b = CxlBridge::new_and_register(&engine, &clock, &top, "bridge_b", &config).unwrap();

    assert!(bridge_a.receive_request(read_at(1, 0)).is_accepted());
    assert!(bridge_b.receive_request(read_at(1, 0)).is_accepted());
    assert_eq!(
        bridge_a.receive_request(read_at(2, 0)).reason(),
        Some(&RejectReason::Busy)
    );
    assert_eq!(bridge_a.num_outstanding(), 1);
    assert_eq!(bridge_b.num_outstanding(), 1);
}
