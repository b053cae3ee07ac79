// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use cxl_components::sink::Sink;
use cxl_engine::port::OutPort;
use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

#[test]
fn sink_records_arrival_times() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let sink = Sink::<u64>::new_and_register(&engine, &clock, &top, "sink").unwrap();
    let mut tx = OutPort::new(&top, "tx");
    tx.connect(sink.port_rx()).unwrap();

    {
        let clock = clock.clone();
        engine.spawn(async move {
            for i in 0..3 {
                clock.wait_ticks(10).await;
                tx.put(i)?.await;
            }
            Ok(())
        });
    }

    run_simulation!(engine);
    let received: Vec<(u64, u64)> = sink
        .received()
        .iter()
        .map(|(value, tick)| (*value, tick.tick()))
        .collect();
    assert_eq!(received, vec![(0, 10), (1, 20), (2, 30)]);
    assert_eq!(sink.num_sunk(), 3);
}

#[test]
fn sink_rx_only_connects_once() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let top = engine.top().clone();

    let sink = Sink::<u64>::new_and_register(&engine, &clock, &top, "sink").unwrap();
    let mut tx_a = OutPort::<u64>::new(&top, "tx_a");
    let mut tx_b = OutPort::<u64>::new(&top, "tx_b");
    tx_a.connect(sink.port_rx()).unwrap();
    assert!(tx_b.connect(sink.port_rx()).is_err());
    assert!(!tx_b.is_connected());

    run_simulation!(engine);
    assert_eq!(sink.num_sunk(), 0);
}
