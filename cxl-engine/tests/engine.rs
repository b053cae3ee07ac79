// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use async_trait::async_trait;
use cxl_engine::engine::Engine;
use cxl_engine::events::once::Once;
use cxl_engine::events::repeated::Repeated;
use cxl_engine::port::{InPort, OutPort};
use cxl_engine::test_helpers::start_test;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, Runnable};
use cxl_engine::types::SimResult;
use cxl_engine::{run_simulation, sim_error};

#[test]
fn error_stops_simulation() {
    let mut engine = start_test(file!());
    engine.spawn(async { sim_error!("stop here") });
    run_simulation!(engine, "Error: stop here");
}

#[test]
fn put_get() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let mut tx = OutPort::new(engine.top(), "tx");
    let rx = InPort::new(engine.top(), "rx");
    tx.connect(rx.state()).unwrap();

    const NUM_PUTS: u64 = 10;
    {
        let clock = clock.clone();
        engine.spawn(async move {
            for i in 0..NUM_PUTS {
                tx.put(i)?.await;
                clock.wait_ticks(1).await;
            }
            Ok(())
        });
    }

    let received = Rc::new(RefCell::new(Vec::new()));
    {
        let received = received.clone();
        engine.spawn(async move {
            for _ in 0..NUM_PUTS {
                let value = rx.get()?.await;
                received.borrow_mut().push(value);
            }
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(*received.borrow(), (0..NUM_PUTS).collect::<Vec<_>>());
}

#[test]
fn put_blocks_until_consumed() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let mut tx = OutPort::new(engine.top(), "tx");
    let rx = InPort::new(engine.top(), "rx");
    tx.connect(rx.state()).unwrap();

    let put_done_at = Rc::new(Cell::new(0));
    {
        let clock = clock.clone();
        let put_done_at = put_done_at.clone();
        engine.spawn(async move {
            tx.put(7_u64)?.await;
            put_done_at.set(clock.tick_now().tick());
            Ok(())
        });
    }
    {
        let clock = clock.clone();
        engine.spawn(async move {
            clock.wait_ticks(25).await;
            assert_eq!(rx.get()?.await, 7);
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(put_done_at.get(), 25);
}

#[test]
fn unconnected_ports() {
    let engine = start_test(file!());
    let tx: OutPort<u64> = OutPort::new(engine.top(), "tx");
    assert!(tx.put(1).is_err());

    let rx: InPort<u64> = InPort::new(engine.top(), "rx");
    assert!(rx.get().is_err());
}

#[test]
fn connect_twice() {
    let engine = start_test(file!());
    let mut tx: OutPort<u64> = OutPort::new(engine.top(), "tx");
    let rx: InPort<u64> = InPort::new(engine.top(), "rx");
    tx.connect(rx.state()).unwrap();
    assert!(rx.state().is_err());

    let other: InPort<u64> = InPort::new(engine.top(), "other");
    assert!(tx.connect(other.state()).is_err());
}

#[test]
fn once_event() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let event = Once::new(5_u64);

    let seen = Rc::new(Cell::new(0));
    for _ in 0..3 {
        let event = event.clone();
        let seen = seen.clone();
        engine.spawn(async move {
            let value = event.listen().await;
            seen.set(seen.get() + value);
            Ok(())
        });
    }
    {
        let event = event.clone();
        engine.spawn(async move {
            clock.wait_ticks(3).await;
            event.notify()
        });
    }

    run_simulation!(engine);
    assert_eq!(seen.get(), 15);
    assert!(event.triggered());
    assert!(event.notify().is_err());
}

#[test]
fn repeated_event() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let event: Repeated<u64> = Repeated::new(0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    {
        let event = event.clone();
        let seen = seen.clone();
        engine.spawn(async move {
            for _ in 0..3 {
                seen.borrow_mut().push(event.listen().await);
            }
            Ok(())
        });
    }
    engine.spawn(async move {
        for i in 1..=3 {
            clock.wait_ticks(1).await;
            event.notify_result(i)?;
        }
        Ok(())
    });

    run_simulation!(engine);
    assert_eq!(*seen.borrow(), vec![1, 2, 3]);
}

struct Ticker {
    clock: Clock,
    ticks: Rc<Cell<u64>>,
}

#[async_trait(?Send)]
impl Runnable for Ticker {
    async fn run(&self) -> SimResult {
        for _ in 0..4 {
            self.clock.wait_ticks(10).await;
            self.ticks.set(self.ticks.get() + 1);
        }
        Ok(())
    }
}

#[test]
fn registered_components_run() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();
    let ticks = Rc::new(Cell::new(0));
    engine.register(Rc::new(Ticker {
        clock,
        ticks: ticks.clone(),
    }));

    run_simulation!(engine);
    assert_eq!(ticks.get(), 4);
}

#[test]
fn run_until_then_resume() {
    let mut engine: Engine = start_test(file!());
    let clock = engine.default_clock();
    let ticks = Rc::new(Cell::new(0));
    engine.register(Rc::new(Ticker {
        clock: clock.clone(),
        ticks: ticks.clone(),
    }));

    let pause = Once::default();
    {
        let pause = pause.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            clock.wait_ticks(15).await;
            pause.notify()
        });
    }

    engine.run_until(Box::new(pause)).unwrap();
    assert_eq!(ticks.get(), 1);

    run_simulation!(engine);
    assert_eq!(ticks.get(), 4);
    assert_eq!(clock.tick_now().tick(), 40);
}
