// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Different types of events.
//!
//! Events should be used to coordinate between
//! [spawned](crate::executor::Spawner) tasks so that they can run in an
//! event-driven manner and yield until there is something ready to process.
//!
//! [Basic events](crate::events::once) are created to be triggered once using
//! the `notify()` method. [Repeated events](crate::events::repeated) can be
//! triggered any number of times. Any number of other tasks can be waiting for
//! an event to be triggered. The `listen()` method is used to wait for the
//! event to be triggered.
//!
//! # Example:
//!
//! An event being created to co-ordinate between two tasks.
//!
//! ```rust
//! # use cxl_engine::engine::Engine;
//! # use cxl_engine::events::once::Once;
//! # use cxl_engine::run_simulation;
//! # use cxl_engine::traits::Event;
//! #
//! fn spawn_listen(engine: &mut Engine, event: Once<()>) {
//!     engine.spawn(async move {
//!         event.listen().await;
//!         println!("After event");
//!         Ok(())
//!     });
//! }
//!
//! fn spawn_notify(engine: &mut Engine, event: Once<()>) {
//!     let clock = engine.default_clock();
//!     engine.spawn(async move {
//!         clock.wait_ticks(10).await;
//!         println!("Trigger event");
//!         event.notify()
//!     });
//! }
//!
//! fn main() {
//!     let mut engine = Engine::default();
//!     let event = Once::default();
//!     spawn_listen(&mut engine, event.clone());
//!     spawn_notify(&mut engine, event);
//!     run_simulation!(engine);
//!     # assert_eq!(engine.time_now_ns(), 10.0);
//! }
//! ```

pub mod once;
pub mod repeated;
