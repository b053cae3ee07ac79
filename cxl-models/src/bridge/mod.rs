// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The CXL.mem bridge.
//!
//! A request offered by the host is filtered by [range], translated and
//! admitted into the [tracker] in a single step, so a rejected request never
//! leaves any state behind. Once admitted it is:
//!  - delayed by the [timing] model and dispatched to the device,
//!  - matched against the device completion,
//!  - delivered back to the host after the response latency.
//!
//! Every admitted request produces exactly one response. If the device does
//! not answer before the deadline a timeout error is delivered instead.
//!
//! A device response that matches nothing is a protocol violation. It faults
//! the bridge, which then rejects all new requests until [CxlBridge::reset].
//!
//! # Ports
//!
//! This component has:
//!  - cpu_side: [MemoryResponse]s to the host
//!  - mem_side: [DeviceRequest]s to the device
//!  - mem_side_response: [DeviceResponse]s from the device
//!
//! Requests are submitted through [RequestResponder::receive_request].

pub mod config;
pub mod functional;
pub mod ports;
pub mod range;
pub mod stats;
pub mod timing;
pub mod tracker;
pub mod translate;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::release_queue::ReleaseQueue;
use cxl_engine::engine::Engine;
use cxl_engine::events::repeated::Repeated;
use cxl_engine::executor::Spawner;
use cxl_engine::port::PortStateResult;
use cxl_engine::sim_error;
use cxl_engine::time::clock::Clock;
use cxl_engine::traits::{Event, Runnable, SimObject, TotalBytes};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::{EntityDisplay, EntityGet};
use cxl_track::entity::Entity;
use cxl_track::{Id, Unique, debug, enter, error, info, trace, warn};

use crate::bridge::config::BridgeConfig;
use crate::bridge::functional::{FunctionalAccess, FunctionalError};
use crate::bridge::ports::{Admission, CpuSidePort, MemSidePort, RejectReason, RequestResponder};
use crate::bridge::range::AddressRange;
use crate::bridge::stats::BridgeStats;
use crate::bridge::timing::LatencyModel;
use crate::bridge::tracker::{Completion, TrackerError, TransactionTracker};
use crate::bridge::translate::{to_device_request, to_host_response};
use crate::protocol::{DeviceRequest, DeviceResponse};
use crate::transaction::{MemoryRequest, MemoryResponse, TransactionId};

/// A device request waiting to be sent, tagged with the admission it
/// belongs to.
#[derive(Clone, Debug)]
struct Dispatch {
    sequence: u64,
    request: DeviceRequest,
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (admission {})", self.request, self.sequence)
    }
}

impl Unique for Dispatch {
    fn id(&self) -> Id {
        self.request.id()
    }
}

impl TotalBytes for Dispatch {
    fn total_bytes(&self) -> usize {
        self.request.total_bytes()
    }
}

impl SimObject for Dispatch {}

/// State shared with the bridge's background tasks.
struct BridgeState {
    entity: Rc<Entity>,
    clock: Clock,
    tracker: RefCell<TransactionTracker>,
    stats: RefCell<BridgeStats>,
    faulted: Cell<bool>,

    /// Fired when a transient rejection may have cleared.
    retry: Repeated<()>,

    /// Fired when an entry finishes and may be deliverable.
    finished: Repeated<()>,
}

impl BridgeState {
    fn expire(&self, id: TransactionId) -> SimResult {
        let now = self.clock.tick_now();
        if self.tracker.borrow_mut().expire(id, now) {
            warn!(self.entity ; "transaction {} timed out at {}", id, now);
            self.stats.borrow_mut().timeouts += 1;
            self.finished.notify()?;
        }
        Ok(())
    }
}

#[derive(EntityDisplay, EntityGet)]
pub struct CxlBridge {
    pub entity: Rc<Entity>,
    spawner: Spawner,
    range: AddressRange,
    latency: LatencyModel,
    timeout_ticks: u64,
    state: Rc<BridgeState>,
    dispatch_queue: ReleaseQueue<Dispatch>,
    cpu_side_port: Rc<CpuSidePort>,
    mem_side_port: Rc<MemSidePort>,
    functional_target: RefCell<Option<Rc<dyn FunctionalAccess>>>,
}

impl CxlBridge {
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        config: &BridgeConfig,
    ) -> Result<Rc<Self>, SimError> {
        config.validate()?;

        let entity = Rc::new(Entity::new(parent, name));
        let spawner = engine.spawner();
        let range = config.address_range()?;
        let latency = config.latency_model()?;
        let state = Rc::new(BridgeState {
            entity: entity.clone(),
            clock: clock.clone(),
            tracker: RefCell::new(TransactionTracker::new(
                config.max_outstanding,
                config.ordering,
            )),
            stats: RefCell::new(BridgeStats::default()),
            faulted: Cell::new(false),
            retry: Repeated::default(),
            finished: Repeated::default(),
        });
        let dispatch_queue = ReleaseQueue::new(&entity, "dispatch", clock, spawner.clone());
        let cpu_side_port = Rc::new(CpuSidePort::new(&entity, "cpu_side_port"));
        let mem_side_port = Rc::new(MemSidePort::new(&entity, "mem_side_port"));

        info!(entity ; "range {}, {:?} ordering, {} entries", range, config.ordering, config.max_outstanding);

        let rc_self = Rc::new(Self {
            entity,
            spawner,
            range,
            latency,
            timeout_ticks: config.timeout_ticks,
            state,
            dispatch_queue,
            cpu_side_port,
            mem_side_port,
            functional_target: RefCell::new(None),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn connect_port_cpu_side(&self, port_state: PortStateResult<MemoryResponse>) -> SimResult {
        self.cpu_side_port.connect(port_state)
    }

    pub fn connect_port_mem_side(&self, port_state: PortStateResult<DeviceRequest>) -> SimResult {
        self.mem_side_port.connect(port_state)
    }

    pub fn port_mem_side_response(&self) -> PortStateResult<DeviceResponse> {
        self.mem_side_port.port_response()
    }

    #[must_use]
    pub fn range(&self) -> &AddressRange {
        &self.range
    }

    #[must_use]
    pub fn latency(&self) -> &LatencyModel {
        &self.latency
    }

    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        self.state.stats.borrow().clone()
    }

    #[must_use]
    pub fn is_faulted(&self) -> bool {
        self.state.faulted.get()
    }

    /// Number of transactions currently held by the tracker.
    #[must_use]
    pub fn num_outstanding(&self) -> usize {
        self.state.tracker.borrow().len()
    }

    #[must_use]
    pub fn has_transaction(&self, id: TransactionId) -> bool {
        self.state.tracker.borrow().get(id).is_some()
    }

    /// Clear a fault and forget timed-out transaction ids.
    pub fn reset(&self) -> SimResult {
        let was_faulted = self.state.faulted.replace(false);
        let num_forgotten = self.state.tracker.borrow_mut().clear_quarantine();
        info!(self.entity ; "reset (faulted: {}, forgotten ids: {})", was_faulted, num_forgotten);
        self.state.retry.notify()
    }

    fn reject(&self, reason: RejectReason, request: MemoryRequest) -> Admission {
        debug!(self.entity ; "reject {}: {}", request, reason);
        self.state.stats.borrow_mut().record_rejection(&reason);
        Admission::Rejected { reason, request }
    }

    fn spawn_watchdog(&self, id: TransactionId, released: Rc<Cell<bool>>) {
        let state = self.state.clone();
        let timeout_ticks = self.timeout_ticks;
        self.spawner.spawn(async move {
            state
                .clock
                .wait_ticks_or_release(timeout_ticks, &released)
                .await;
            if released.get() {
                return Ok(());
            }
            state.expire(id)
        });
    }

    /// Handle a completion from the device.
    ///
    /// Returns whether the response matched a transaction. One that does not
    /// faults the bridge.
    pub fn receive_response(&self, response: DeviceResponse) -> Result<bool, SimError> {
        enter!(self.mem_side_port.entity ; response.id());
        let now = self.state.clock.tick_now();
        let deliver_at = now.plus(self.latency.response_latency());
        let host_response = to_host_response(&response, now);

        let completion = self
            .state
            .tracker
            .borrow_mut()
            .complete(host_response, deliver_at);
        match completion {
            Ok(Completion::Matched) => {
                trace!(self.entity ; "{} completing, deliver at {}", response, deliver_at);
                self.state.finished.notify()?;
                Ok(true)
            }
            Ok(Completion::LateDiscarded) => {
                warn!(self.entity ; "discarding late {}", response);
                self.state.stats.borrow_mut().late_responses_discarded += 1;
                Ok(true)
            }
            Err(e) => {
                error!(self.entity ; "protocol violation: {}: {}", response, e);
                self.state.faulted.set(true);
                self.state.stats.borrow_mut().protocol_violations += 1;
                Ok(false)
            }
        }
    }

    /// Attach the device used for functional accesses.
    pub fn set_functional_target(&self, target: Rc<dyn FunctionalAccess>) {
        *self.functional_target.borrow_mut() = Some(target);
    }

    fn functional_target(
        &self,
        address: u64,
        size: usize,
    ) -> Result<Rc<dyn FunctionalAccess>, FunctionalError> {
        if !self.range.contains(address, size) {
            return Err(FunctionalError::OutOfRange {
                address,
                size,
                range: self.range,
            });
        }
        self.functional_target
            .borrow()
            .clone()
            .ok_or(FunctionalError::NoTarget)
    }

    /// Read device memory without consuming simulated time.
    pub fn functional_read(&self, address: u64, size: usize) -> Result<Vec<u8>, FunctionalError> {
        let target = self.functional_target(address, size)?;
        Ok(target.functional_read(address, size))
    }

    /// Write device memory without consuming simulated time.
    pub fn functional_write(&self, address: u64, data: &[u8]) -> Result<(), FunctionalError> {
        let target = self.functional_target(address, data.len())?;
        target.functional_write(address, data);
        Ok(())
    }
}

impl RequestResponder for CxlBridge {
    fn receive_request(&self, request: MemoryRequest) -> Admission {
        enter!(self.cpu_side_port.entity ; request.id());
        if self.state.faulted.get() {
            return self.reject(RejectReason::Faulted, request);
        }
        if !self.range.contains(request.address, request.size) {
            return self.reject(RejectReason::OutOfRange, request);
        }
        let device_request = match to_device_request(&request) {
            Ok(device_request) => device_request,
            Err(e) => return self.reject(RejectReason::Unsupported(e), request),
        };

        let now = self.state.clock.tick_now();
        let deadline = now.plus(self.timeout_ticks);
        let admitted =
            self.state
                .tracker
                .borrow_mut()
                .admit(request.clone(), device_request.clone(), now, deadline);
        let admitted = match admitted {
            Ok(admitted) => admitted,
            Err(TrackerError::DuplicateId(_) | TrackerError::Quarantined(_)) => {
                return self.reject(RejectReason::DuplicateId, request);
            }
            Err(_) => return self.reject(RejectReason::Busy, request),
        };

        {
            let tracker = self.state.tracker.borrow();
            let mut stats = self.state.stats.borrow_mut();
            stats.accepted += 1;
            stats.occupancy.record(tracker.len() as u64);
            if tracker.is_full() {
                stats.queue_full_events += 1;
            }
        }

        let delay = self.latency.delay_for(&request);
        debug!(self.entity ; "accept {}, dispatch in {} ticks", request, delay);
        let dispatch = Dispatch {
            sequence: admitted.sequence,
            request: device_request,
        };
        if let Err(e) = self.dispatch_queue.push_after(dispatch, delay) {
            error!(self.entity ; "failed to queue {}: {}", request, e);
        }
        self.spawn_watchdog(request.transaction_id, admitted.watchdog);
        Admission::Accepted
    }

    fn retry_event(&self) -> Repeated<()> {
        self.state.retry.clone()
    }
}

async fn dispatch_requests(
    state: Rc<BridgeState>,
    queue: ReleaseQueue<Dispatch>,
    port: Rc<MemSidePort>,
) -> SimResult {
    loop {
        let Dispatch { sequence, request } = queue.pop().await;
        let dispatched = state
            .tracker
            .borrow_mut()
            .mark_dispatched(request.transaction_id, sequence);
        if let Err(e) = dispatched {
            debug!(state.entity ; "not dispatching {}: {}", request, e);
            continue;
        }
        state.stats.borrow_mut().dispatched += 1;
        port.send_request(request).await?;
    }
}

async fn deliver_responses(state: Rc<BridgeState>, port: Rc<CpuSidePort>) -> SimResult {
    loop {
        let next = state.tracker.borrow().next_delivery();
        let Some((id, deliver_at)) = next else {
            state.finished.listen().await;
            continue;
        };

        let now = state.clock.tick_now();
        if deliver_at > now {
            state.clock.wait_ticks(deliver_at.ticks_since(now)).await;
            continue;
        }

        let response = state
            .tracker
            .borrow()
            .get(id)
            .and_then(|entry| entry.response().cloned());
        let Some(mut response) = response else {
            return sim_error!(format!("transaction {id} has no response to deliver"));
        };
        response.completion_time = now;
        port.send_response(response.clone()).await?;

        let entry = state.tracker.borrow_mut().remove(id)?;
        let round_trip = state.clock.tick_now().ticks_since(entry.admitted_at);
        trace!(state.entity ; "delivered {} after {} ticks", response, round_trip);
        state
            .stats
            .borrow_mut()
            .record_delivery(&response, round_trip);
        state.retry.notify()?;
    }
}

#[async_trait(?Send)]
impl Runnable for CxlBridge {
    async fn run(&self) -> SimResult {
        self.spawner.spawn(dispatch_requests(
            self.state.clone(),
            self.dispatch_queue.clone(),
            self.mem_side_port.clone(),
        ));
        self.spawner.spawn(deliver_responses(
            self.state.clone(),
            self.cpu_side_port.clone(),
        ));

        loop {
            let response = self.mem_side_port.receive_response().await?;
            self.receive_response(response)?;
        }
    }
}
