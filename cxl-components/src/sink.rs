// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Sink components.

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_engine::engine::Engine;
use cxl_engine::port::{InPort, PortStateResult};
use cxl_engine::time::clock::{Clock, ClockTick};
use cxl_engine::traits::{Runnable, SimObject};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::EntityDisplay;
use cxl_track::entity::Entity;
use cxl_track::{Unique, enter};

use crate::{port_rx, take_option};

/// Consumes everything sent to it, remembering what arrived and when.
#[derive(EntityDisplay)]
pub struct Sink<T>
where
    T: SimObject,
{
    pub entity: Rc<Entity>,
    clock: Clock,
    received: RefCell<Vec<(T, ClockTick)>>,
    rx: RefCell<Option<InPort<T>>>,
}

impl<T> Sink<T>
where
    T: SimObject,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            clock: clock.clone(),
            received: RefCell::new(Vec::new()),
            rx: RefCell::new(Some(rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn port_rx(&self) -> PortStateResult<T> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn num_sunk(&self) -> usize {
        self.received.borrow().len()
    }

    /// Everything received so far along with the tick it arrived.
    #[must_use]
    pub fn received(&self) -> Vec<(T, ClockTick)> {
        self.received.borrow().clone()
    }
}

#[async_trait(?Send)]
impl<T> Runnable for Sink<T>
where
    T: SimObject,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        loop {
            let value = rx.get()?.await;
            enter!(self.entity ; value.id());
            self.received
                .borrow_mut()
                .push((value, self.clock.tick_now()));
        }
    }
}
