// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Helpers for testing the bridge against a device whose behaviour is chosen
//! by the test.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::release_queue::ReleaseQueue;
use cxl_components::{connect_port, connect_tx, port_rx, take_option};
use cxl_engine::engine::Engine;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::time::clock::{Clock, ClockTick};
use cxl_engine::traits::Runnable;
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::EntityDisplay;
use cxl_track::entity::Entity;
use cxl_track::{debug, trace};

use crate::bridge::CxlBridge;
use crate::bridge::config::{BridgeConfig, DEFAULT_RANGE_BASE};
use crate::protocol::{DeviceRequest, DeviceResponse, M2sOpcode};
use crate::transaction::{MemoryRequest, TransactionId};

/// How a [ScriptedDevice] answers requests.
#[derive(Clone, Debug)]
pub enum CompletionScript {
    /// Respond in the tick the request arrives.
    Immediate,
    /// Respond a fixed number of ticks after each request arrives.
    Delayed(u64),
    /// Hold requests back and respond in this order. Each response is sent
    /// once its request and all those before it in the list have arrived.
    Order(Vec<TransactionId>),
    /// Respond immediately with poisoned data.
    Poison,
    /// Never respond.
    Never,
    /// Take no requests for this many ticks, then respond immediately.
    StallAccept(u64),
}

/// Data returned for a read of `size` bytes at `address`.
#[must_use]
pub fn pattern_data(address: u64, size: usize) -> Vec<u8> {
    (0..size as u64).map(|i| (address + i) as u8).collect()
}

fn respond(request: &DeviceRequest) -> DeviceResponse {
    match request.opcode {
        M2sOpcode::MemRd => {
            DeviceResponse::complete(request, Some(pattern_data(request.address, request.size)))
        }
        M2sOpcode::MemWr | M2sOpcode::MemWrPtl => DeviceResponse::complete(request, None),
    }
}

#[derive(EntityDisplay)]
pub struct ScriptedDevice {
    pub entity: Rc<Entity>,
    clock: Clock,
    spawner: Spawner,
    script: CompletionScript,
    order: RefCell<VecDeque<TransactionId>>,
    held: RefCell<Vec<DeviceRequest>>,
    received: RefCell<Vec<(DeviceRequest, ClockTick)>>,
    responses: ReleaseQueue<DeviceResponse>,
    rx: RefCell<Option<InPort<DeviceRequest>>>,
    tx: RefCell<Option<OutPort<DeviceResponse>>>,
}

impl ScriptedDevice {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        script: CompletionScript,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let tx = OutPort::new(&entity, "tx");
        let responses = ReleaseQueue::new(&entity, "responses", clock, engine.spawner());
        let order = match &script {
            CompletionScript::Order(order) => order.iter().copied().collect(),
            _ => VecDeque::new(),
        };

        let rc_self = Rc::new(Self {
            entity,
            clock: clock.clone(),
            spawner: engine.spawner(),
            script,
            order: RefCell::new(order),
            held: RefCell::new(Vec::new()),
            received: RefCell::new(Vec::new()),
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

    /// Requests seen so far and when they arrived.
    #[must_use]
    pub fn received(&self) -> Vec<(DeviceRequest, ClockTick)> {
        self.received.borrow().clone()
    }

    /// Send a response that was not asked for.
    pub fn send_unsolicited(&self, response: DeviceResponse) -> SimResult {
        debug!(self.entity ; "unsolicited {}", response);
        self.responses.push_now(response)
    }

    fn release_in_order(&self) -> SimResult {
        let mut order = self.order.borrow_mut();
        let mut held = self.held.borrow_mut();
        while let Some(&next) = order.front() {
            let Some(index) = held.iter().position(|r| r.transaction_id == next) else {
                break;
            };
            order.pop_front();
            let request = held.remove(index);
            self.responses.push_now(respond(&request))?;
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl Runnable for ScriptedDevice {
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        let tx = take_option!(self.tx);
        self.spawner.spawn(self.responses.clone().drain_into(tx));
        if let CompletionScript::StallAccept(ticks) = self.script {
            self.clock.wait_ticks(ticks).await;
        }

        loop {
            let request = rx.get()?.await;
            trace!(self.entity ; "received {}", request);
            self.received
                .borrow_mut()
                .push((request.clone(), self.clock.tick_now()));

            match &self.script {
                CompletionScript::Immediate | CompletionScript::StallAccept(_) => {
                    self.responses.push_now(respond(&request))?;
                }
                CompletionScript::Delayed(ticks) => {
                    self.responses.push_after(respond(&request), *ticks)?;
                }
                CompletionScript::Order(_) => {
                    self.held.borrow_mut().push(request);
                    self.release_in_order()?;
                }
                CompletionScript::Poison => {
                    self.responses.push_now(DeviceResponse::poisoned(&request))?;
                }
                CompletionScript::Never => {}
            }
        }
    }
}

/// Build a bridge with a [ScriptedDevice] on its memory side. The cpu side
/// is left for the test to connect.
pub fn bridge_with_scripted_device(
    engine: &Engine,
    clock: &Clock,
    config: &BridgeConfig,
    script: CompletionScript,
) -> Result<(Rc<CxlBridge>, Rc<ScriptedDevice>), SimError> {
    let top = engine.top();
    let bridge = CxlBridge::new_and_register(engine, clock, top, "bridge", config)?;
    let device = ScriptedDevice::new_and_register(engine, clock, top, "device", script)?;
    connect_port!(bridge, mem_side => device, rx)?;
    connect_port!(device, tx => bridge, mem_side_response)?;
    Ok((bridge, device))
}

/// A 64 byte read at `offset` into the default CXL range.
#[must_use]
pub fn read_at(transaction_id: TransactionId, offset: u64) -> MemoryRequest {
    MemoryRequest::read(transaction_id, DEFAULT_RANGE_BASE + offset, 64)
}

/// A write of `data` at `offset` into the default CXL range.
#[must_use]
pub fn write_at(transaction_id: TransactionId, offset: u64, data: Vec<u8>) -> MemoryRequest {
    MemoryRequest::write(transaction_id, DEFAULT_RANGE_BASE + offset, data)
}
