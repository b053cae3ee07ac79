// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! An event that can be triggered multiple times. The event allows
//! the notifier to pass a custom result to its listeners on each
//! notification, using the `notify_result()` method. Otherwise the last
//! result set is provided to the listeners.
//!
//! A listener only sees notifications made after it started listening, so
//! callers should re-check their condition in a loop:
//!
//! ```rust
//! # use std::cell::Cell;
//! # use std::rc::Rc;
//! # use cxl_engine::events::repeated::Repeated;
//! # use cxl_engine::traits::Event;
//! # async fn wait_for_space(space: Rc<Cell<usize>>, changed: Repeated<()>) {
//! while space.get() == 0 {
//!     changed.listen().await;
//! }
//! # }
//! ```

use std::cell::RefCell;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use futures::Future;
use futures::future::FusedFuture;

use crate::traits::{BoxFuture, Event};
use crate::types::SimResult;

pub struct RepeatedState<T>
where
    T: Copy,
{
    listen_waiting: RefCell<Vec<Waker>>,
    result: RefCell<T>,

    /// Incremented on every notification.
    generation: RefCell<u64>,
}

impl<T> RepeatedState<T>
where
    T: Copy,
{
    pub fn new(value: T) -> Self {
        Self {
            listen_waiting: RefCell::new(Vec::new()),
            result: RefCell::new(value),
            generation: RefCell::new(0),
        }
    }
}

#[derive(Clone)]
pub struct Repeated<T>
where
    T: Copy,
{
    state: Rc<RepeatedState<T>>,
}

pub struct RepeatedFuture<T>
where
    T: Copy,
{
    state: Rc<RepeatedState<T>>,

    /// The generation seen when first polled.
    started_at: Option<u64>,
    done: bool,
}

impl<T> FusedFuture for RepeatedFuture<T>
where
    T: Copy,
{
    fn is_terminated(&self) -> bool {
        self.done
    }
}

impl<T> Repeated<T>
where
    T: Copy,
{
    pub fn new(value: T) -> Self {
        Self {
            state: Rc::new(RepeatedState::new(value)),
        }
    }

    pub fn notify(&self) -> SimResult {
        *self.state.generation.borrow_mut() += 1;
        for waker in self.state.listen_waiting.borrow_mut().drain(..) {
            waker.wake();
        }
        Ok(())
    }

    pub fn notify_result(&self, result: T) -> SimResult {
        *self.state.result.borrow_mut() = result;
        self.notify()
    }
}

impl Default for Repeated<()> {
    fn default() -> Self {
        Self::new(())
    }
}

impl<T> Event<T> for Repeated<T>
where
    T: Copy + 'static,
{
    fn listen(&self) -> BoxFuture<'static, T> {
        Box::pin(RepeatedFuture {
            state: self.state.clone(),
            started_at: None,
            done: false,
        })
    }

    fn clone_dyn(&self) -> Box<dyn Event<T>> {
        Box::new(self.clone())
    }
}

impl<T> Future for RepeatedFuture<T>
where
    T: Copy,
{
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let generation = *self.state.generation.borrow();
        match self.started_at {
            Some(started_at) if generation != started_at => {
                self.done = true;
                Poll::Ready(*self.state.result.borrow())
            }
            _ => {
                if self.started_at.is_none() {
                    self.started_at = Some(generation);
                }
                self.state
                    .listen_waiting
                    .borrow_mut()
                    .push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
