// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! CXL-attached memory devices.
//!
//! A [Memory] services M2S requests from its backing store. Each access is
//! timed by a [MemoryTiming] model and the responses are released as each
//! access completes, so a quick access can overtake a slower one.
//!
//! # Ports
//!
//! This component has:
//!  - One [input port](cxl_engine::port::InPort): `rx` ([DeviceRequest]s)
//!  - One [output port](cxl_engine::port::OutPort): `tx` ([DeviceResponse]s)

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::release_queue::ReleaseQueue;
use cxl_components::{connect_tx, port_rx, take_option};
use cxl_engine::engine::Engine;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::Runnable;
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::{debug, warn};

use crate::bridge::functional::FunctionalAccess;
use crate::memory::store::BackingStore;
use crate::memory::timing::MemoryTiming;
use crate::protocol::{DeviceRequest, DeviceResponse, M2sOpcode};

pub mod store;
pub mod timing;

#[derive(Clone, Copy, Debug)]
pub struct MemoryConfig {
    base_address: u64,
    capacity_bytes: u64,
}

impl MemoryConfig {
    #[must_use]
    pub fn new(base_address: u64, capacity_bytes: u64) -> Self {
        Self {
            base_address,
            capacity_bytes,
        }
    }

    fn holds(&self, address: u64, size: usize) -> bool {
        address >= self.base_address
            && (address - self.base_address)
                .checked_add(size as u64)
                .is_some_and(|end| end <= self.capacity_bytes)
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryMetrics {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    pub poisoned: u64,
}

#[derive(EntityGet, EntityDisplay)]
pub struct Memory<M>
where
    M: MemoryTiming + 'static,
{
    pub entity: Rc<Entity>,
    clock: Clock,
    config: MemoryConfig,
    timing: RefCell<M>,
    store: RefCell<BackingStore>,
    metrics: RefCell<MemoryMetrics>,
    spawner: Spawner,

    responses: ReleaseQueue<DeviceResponse>,
    rx: RefCell<Option<InPort<DeviceRequest>>>,
    tx: RefCell<Option<OutPort<DeviceResponse>>>,
}

impl<M> Memory<M>
where
    M: MemoryTiming + 'static,
{
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: MemoryConfig,
        timing: M,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let tx = OutPort::new(&entity, "tx");
        let responses = ReleaseQueue::new(&entity, "responses", clock, engine.spawner());

        let rc_self = Rc::new(Self {
            entity,
            clock: clock.clone(),
            config,
            timing: RefCell::new(timing),
            store: RefCell::new(BackingStore::new()),
            metrics: RefCell::new(MemoryMetrics::default()),
            spawner: engine.spawner(),
            responses,
            rx: RefCell::new(Some(rx)),
            tx: RefCell::new(Some(tx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_tx(&self, port_state: PortStateResult<DeviceResponse>) -> SimResult {
        connect_tx!(self.tx, connect ; port_state)
    }

    pub fn port_rx(&self) -> PortStateResult<DeviceRequest> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn metrics(&self) -> MemoryMetrics {
        self.metrics.borrow().clone()
    }

    fn access(&self, request: &DeviceRequest) -> DeviceResponse {
        if !self.config.holds(request.address, request.size) {
            warn!(self.entity ; "{} outside device memory, poisoning", request);
            self.metrics.borrow_mut().poisoned += 1;
            return DeviceResponse::poisoned(request);
        }

        let mut metrics = self.metrics.borrow_mut();
        match request.opcode {
            M2sOpcode::MemRd => {
                metrics.reads += 1;
                metrics.bytes_read += request.size as u64;
                let data = self.store.borrow().read(request.address, request.size);
                DeviceResponse::complete(request, Some(data))
            }
            M2sOpcode::MemWr | M2sOpcode::MemWrPtl => {
                metrics.writes += 1;
                metrics.bytes_written += request.size as u64;
                let data = request.payload.as_deref().unwrap_or_default();
                if request.opcode == M2sOpcode::MemWrPtl {
                    self.store
                        .borrow_mut()
                        .write_masked(request.address, data, request.byte_enable);
                } else {
                    self.store.borrow_mut().write(request.address, data);
                }
                DeviceResponse::complete(request, None)
            }
        }
    }
}

impl<M> FunctionalAccess for Memory<M>
where
    M: MemoryTiming + 'static,
{
    fn functional_read(&self, address: u64, size: usize) -> Vec<u8> {
        self.store.borrow().read(address, size)
    }

    fn functional_write(&self, address: u64, data: &[u8]) {
        self.store.borrow_mut().write(address, data);
    }
}

#[async_trait(?Send)]
impl<M> Runnable for Memory<M>
where
    M: MemoryTiming + 'static,
{
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        let tx = take_option!(self.tx);

        self.spawner.spawn(self.responses.clone().drain_into(tx));

        loop {
            let request = rx.get()?.await;
            let (latency, occupancy) = {
                let mut timing = self.timing.borrow_mut();
                (timing.access_latency(&request), timing.occupancy(&request))
            };
            debug!(self.entity ; "{} takes {} ticks", request, latency);

            let response = self.access(&request);
            self.responses.push_after(response, latency)?;
            if occupancy > 0 {
                self.clock.wait_ticks(occupancy).await;
            }
        }
    }
}
