// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

#![doc(test(attr(warn(unused))))]

//! The engine which executes the event driven asynchronous simulation of the
//! CXL bridge and the models around it.
//!
//! Components are `async` tasks that are [registered](crate::engine::Engine)
//! with the engine. They exchange objects through typed
//! [ports](crate::port), wait on [events](crate::events) and model time by
//! waiting on a [clock](crate::time::clock).
//!
//! # Simple Application
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! use cxl_engine::engine::Engine;
//! use cxl_engine::run_simulation;
//!
//! let mut engine = Engine::default();
//! let clock = engine.default_clock();
//! let done = Rc::new(Cell::new(false));
//! {
//!     let done = done.clone();
//!     engine.spawn(async move {
//!         clock.wait_ticks(50).await;
//!         done.set(true);
//!         Ok(())
//!     });
//! }
//! run_simulation!(engine);
//! assert!(done.get());
//! assert_eq!(engine.time_now_ns(), 50.0);
//! ```

pub mod engine;
pub mod events;
pub mod executor;
pub mod port;
pub mod test_helpers;
pub mod time;
pub mod traits;
pub mod types;

#[macro_export]
/// Spawn all registered components and then run the simulation.
macro_rules! run_simulation {
    ($engine:ident) => {
        $engine.run().unwrap();
    };
    ($engine:ident, $expect:expr) => {
        match $engine.run() {
            Ok(()) => panic!("Expected an error!"),
            Err(e) => assert_eq!(format!("{e}").as_str(), $expect),
        }
    };
}
