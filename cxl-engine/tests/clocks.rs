// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use cxl_engine::run_simulation;
use cxl_engine::test_helpers::start_test;

#[test]
fn wait_advances_time() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let seen = Rc::new(RefCell::new(Vec::new()));
    for delay in [30, 10, 20] {
        let clock = clock.clone();
        let seen = seen.clone();
        engine.spawn(async move {
            clock.wait_ticks(delay).await;
            seen.borrow_mut().push(clock.tick_now().tick());
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(*seen.borrow(), vec![10, 20, 30]);
    assert_eq!(engine.time_now_ns(), 30.0);
}

#[test]
fn zero_wait_does_not_advance() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let done = Rc::new(Cell::new(false));
    {
        let done = done.clone();
        let clock = clock.clone();
        engine.spawn(async move {
            clock.wait_ticks(0).await;
            done.set(true);
            Ok(())
        });
    }

    run_simulation!(engine);
    assert!(done.get());
    assert_eq!(clock.tick_now().tick(), 0);
}

#[test]
fn background_wait_does_not_hold_simulation() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let count = Rc::new(Cell::new(0));
    {
        let clock = clock.clone();
        let count = count.clone();
        engine.spawn(async move {
            loop {
                clock.wait_ticks_or_exit(10).await;
                count.set(count.get() + 1);
            }
        });
    }
    {
        let clock = clock.clone();
        engine.spawn(async move {
            clock.wait_ticks(35).await;
            Ok(())
        });
    }

    run_simulation!(engine);
    assert_eq!(clock.tick_now().tick(), 35);
    assert_eq!(count.get(), 3);
}

#[test]
fn released_wait_can_be_abandoned() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let released = Rc::new(Cell::new(false));
    let fired = Rc::new(Cell::new(false));
    {
        let clock = clock.clone();
        let released = released.clone();
        let fired = fired.clone();
        engine.spawn(async move {
            clock.wait_ticks_or_release(1000, &released).await;
            fired.set(true);
            Ok(())
        });
    }
    {
        let clock = clock.clone();
        let released = released.clone();
        engine.spawn(async move {
            clock.wait_ticks(5).await;
            released.set(true);
            Ok(())
        });
    }

    run_simulation!(engine);
    assert!(!fired.get());
    assert_eq!(clock.tick_now().tick(), 5);
}

#[test]
fn unreleased_wait_completes() {
    let mut engine = start_test(file!());
    let clock = engine.default_clock();

    let released = Rc::new(Cell::new(false));
    let fired = Rc::new(Cell::new(false));
    {
        let clock = clock.clone();
        let fired = fired.clone();
        engine.spawn(async move {
            clock.wait_ticks_or_release(1000, &released).await;
            fired.set(true);
            Ok(())
        });
    }

    run_simulation!(engine);
    assert!(fired.get());
    assert_eq!(clock.tick_now().tick(), 1000);
}
