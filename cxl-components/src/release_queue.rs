// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A queue that releases values after a per-value delay.
//!
//! Unlike a fixed pipeline, values pushed with a short delay can overtake
//! values pushed earlier with a longer delay. Values released on the same
//! tick come out in the order they were pushed.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use cxl_engine::events::repeated::Repeated;
use cxl_engine::executor::Spawner;
use cxl_engine::port::OutPort;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, SimObject};
use cxl_engine::types::SimResult;
use cxl_track::entity::Entity;
use cxl_track::{enter, exit, trace};

struct ReleaseState<T> {
    ready: RefCell<VecDeque<T>>,
    pending: Cell<usize>,
    ready_changed: Repeated<()>,
}

pub struct ReleaseQueue<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    clock: Clock,
    spawner: Spawner,
    state: Rc<ReleaseState<T>>,
}

impl<T> Clone for ReleaseQueue<T>
where
    T: SimObject,
{
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            clock: self.clock.clone(),
            spawner: self.spawner.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T> ReleaseQueue<T>
where
    T: SimObject,
{
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str, clock: &Clock, spawner: Spawner) -> Self {
        Self {
            entity: Rc::new(Entity::new(parent, name)),
            clock: clock.clone(),
            spawner,
            state: Rc::new(ReleaseState {
                ready: RefCell::new(VecDeque::new()),
                pending: Cell::new(0),
                ready_changed: Repeated::default(),
            }),
        }
    }

    /// Make `value` available to `pop()` after `ticks`.
    pub fn push_after(&self, value: T, ticks: u64) -> SimResult {
        enter!(self.entity ; value.id());
        if ticks == 0 {
            return self.release(value);
        }

        trace!(self.entity ; "{} released in {} ticks", value, ticks);
        self.state.pending.set(self.state.pending.get() + 1);
        let queue = self.clone();
        let clock = self.clock.clone();
        self.spawner.spawn(async move {
            clock.wait_ticks(ticks).await;
            queue.state.pending.set(queue.state.pending.get() - 1);
            queue.release(value)
        });
        Ok(())
    }

    /// Make `value` available to `pop()` immediately.
    pub fn push_now(&self, value: T) -> SimResult {
        enter!(self.entity ; value.id());
        self.release(value)
    }

    fn release(&self, value: T) -> SimResult {
        self.state.ready.borrow_mut().push_back(value);
        self.state.ready_changed.notify()
    }

    /// Wait for the next released value.
    pub async fn pop(&self) -> T {
        loop {
            let value = self.state.ready.borrow_mut().pop_front();
            if let Some(value) = value {
                exit!(self.entity ; value.id());
                return value;
            }
            self.state.ready_changed.listen().await;
        }
    }

    /// Forward every released value to `tx`, forever.
    pub async fn drain_into(self, tx: OutPort<T>) -> SimResult {
        loop {
            let value = self.pop().await;
            tx.put(value)?.await;
        }
    }

    /// Number of values still waiting for their release time.
    #[must_use]
    pub fn num_pending(&self) -> usize {
        self.state.pending.get()
    }

    /// Number of values released but not yet popped.
    #[must_use]
    pub fn num_ready(&self) -> usize {
        self.state.ready.borrow().len()
    }
}
