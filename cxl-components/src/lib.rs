// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Reusable components and helpers for building models.
//!
//! Components follow a common pattern:
//!  - they are created with `new_and_register()` which registers them with
//!    the [Engine](cxl_engine::engine::Engine) so that their `run()` is spawned
//!    when the simulation starts.
//!  - ports are stored in a `RefCell<Option<>>` and taken when the component
//!    starts running.
//!  - ports are connected with [connect_port].

pub mod connect;
pub mod release_queue;
pub mod sink;
