// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A set of common traits used across the engine.

use core::mem::size_of;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use cxl_track::Unique;

use crate::types::SimResult;

/// The `TotalBytes` trait is used to determine how many bytes an object
/// represents
///
/// This trait is used to determine how much time an object will take to be
/// sent.
pub trait TotalBytes {
    fn total_bytes(&self) -> usize;
}

/// A super-trait that objects that are passed around the simulation have to
/// implement
///
///  - Clone:       Allows the application to keep copies of objects sent
///    around.
///  - Debug:       In order to print "{:?}" objects have to at least implement
///    Debug.
///  - Display:     Used in log messages.
///  - Unique:      Allows for simple tracing.
///  - TotalBytes:  Allows modelling of transfer time.
///  - 'static:     Due to the way that futures are implemented, the lifetimes
///    need to be `static.
pub trait SimObject: Clone + Debug + Display + Unique + TotalBytes + 'static {}

// Implementations for basic types that can be sent around the simulation for
// testing

impl TotalBytes for u64 {
    fn total_bytes(&self) -> usize {
        size_of::<u64>()
    }
}

impl SimObject for u64 {}

impl TotalBytes for usize {
    fn total_bytes(&self) -> usize {
        size_of::<usize>()
    }
}

impl SimObject for usize {}

/// The `Event` trait defines an object that can be used as an Event
///
/// This is a trait that defines the `listen` function that returns a future
/// so that it can be used in `async` code.
pub trait Event<T> {
    #[must_use = "Futures do nothing unless you `.await` or otherwise use them"]
    fn listen(&self) -> BoxFuture<'static, T>;

    /// Allow cloning of Boxed events
    fn clone_dyn(&self) -> Box<dyn Event<T>>;
}

/// Provide Clone implementation for boxed Event
impl<T> Clone for Box<dyn Event<T>> {
    fn clone(self: &Box<dyn Event<T>>) -> Box<dyn Event<T>> {
        self.clone_dyn()
    }
}

/// A component that is spawned when the simulation starts.
#[async_trait(?Send)]
pub trait Runnable {
    async fn run(&self) -> SimResult {
        Ok(())
    }
}

pub type BoxFuture<'a, T> = Pin<std::boxed::Box<dyn Future<Output = T> + 'a>>;
