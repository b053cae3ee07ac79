// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Drives a list of requests into a [RequestResponder].
//!
//! Requests are offered in order. One rejected as [Busy](RejectReason::Busy)
//! or [Faulted](RejectReason::Faulted) is offered again each time the
//! responder's retry event fires. Any other rejection is recorded and the
//! requester moves on to the next request.
//!
//! # Ports
//!
//! This component has:
//!  - One [input port](cxl_engine::port::InPort): `rx` ([MemoryResponse]s)

use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use cxl_components::{port_rx, take_option};
use cxl_engine::engine::Engine;
use cxl_engine::executor::Spawner;
use cxl_engine::port::{InPort, PortStateResult};
use cxl_engine::time::clock::{Clock, ClockTick};
use cxl_engine::traits::{Event, Runnable};
use cxl_engine::types::{SimError, SimResult};
use cxl_model_builder::EntityDisplay;
use cxl_track::entity::Entity;
use cxl_track::{Unique, debug, enter, trace};

use crate::bridge::ports::{Admission, RejectReason, RequestResponder};
use crate::transaction::{MemoryRequest, MemoryResponse};

type Received = Rc<RefCell<Vec<(MemoryResponse, ClockTick)>>>;

#[derive(EntityDisplay)]
pub struct Requester {
    pub entity: Rc<Entity>,
    clock: Clock,
    spawner: Spawner,
    target: Rc<dyn RequestResponder>,
    requests: RefCell<Option<Vec<MemoryRequest>>>,
    issue_interval: u64,

    num_accepted: RefCell<usize>,
    rejected: RefCell<Vec<(MemoryRequest, RejectReason)>>,
    received: Received,
    rx: RefCell<Option<InPort<MemoryResponse>>>,
}

impl Requester {
    /// Create a requester that offers one request every `issue_interval`
    /// ticks. Zero offers them back to back.
    pub fn new_and_register(
        engine: &Engine,
        clock: &Clock,
        parent: &Rc<Entity>,
        name: &str,
        target: Rc<dyn RequestResponder>,
        requests: Vec<MemoryRequest>,
        issue_interval: u64,
    ) -> Result<Rc<Self>, SimError> {
        let entity = Rc::new(Entity::new(parent, name));
        let rx = InPort::new(&entity, "rx");
        let rc_self = Rc::new(Self {
            entity,
            clock: clock.clone(),
            spawner: engine.spawner(),
            target,
            requests: RefCell::new(Some(requests)),
            issue_interval,
            num_accepted: RefCell::new(0),
            rejected: RefCell::new(Vec::new()),
            received: Rc::new(RefCell::new(Vec::new())),
            rx: RefCell::new(Some(rx)),
        });
        engine.register(rc_self.clone());
        Ok(rc_self)
    }

    pub fn port_rx(&self) -> PortStateResult<MemoryResponse> {
        port_rx!(self.rx, state)
    }

    #[must_use]
    pub fn num_accepted(&self) -> usize {
        *self.num_accepted.borrow()
    }

    /// Requests that were turned away for good, with the reason.
    #[must_use]
    pub fn rejected(&self) -> Vec<(MemoryRequest, RejectReason)> {
        self.rejected.borrow().clone()
    }

    /// Every response received along with the tick it arrived.
    #[must_use]
    pub fn responses(&self) -> Vec<(MemoryResponse, ClockTick)> {
        self.received.borrow().clone()
    }

    #[must_use]
    pub fn num_responses(&self) -> usize {
        self.received.borrow().len()
    }

    async fn issue(&self, request: MemoryRequest) {
        let mut pending = request;
        loop {
            pending.issue_time = self.clock.tick_now();
            let retry = self.target.retry_event();
            match self.target.receive_request(pending) {
                Admission::Accepted => {
                    *self.num_accepted.borrow_mut() += 1;
                    return;
                }
                Admission::Rejected { reason, request } if reason.is_transient() => {
                    trace!(self.entity ; "{} {}, waiting to retry", request, reason);
                    pending = request;
                    retry.listen().await;
                }
                Admission::Rejected { reason, request } => {
                    debug!(self.entity ; "{} rejected: {}", request, reason);
                    self.rejected.borrow_mut().push((request, reason));
                    return;
                }
            }
        }
    }
}

async fn collect_responses(
    entity: Rc<Entity>,
    clock: Clock,
    rx: InPort<MemoryResponse>,
    received: Received,
) -> SimResult {
    loop {
        let response = rx.get()?.await;
        enter!(entity ; response.id());
        received.borrow_mut().push((response, clock.tick_now()));
    }
}

#[async_trait(?Send)]
impl Runnable for Requester {
    async fn run(&self) -> SimResult {
        let rx = take_option!(self.rx);
        let requests = take_option!(self.requests);
        self.spawner.spawn(collect_responses(
            self.entity.clone(),
            self.clock.clone(),
            rx,
            self.received.clone(),
        ));

        for request in requests {
            self.issue(request).await;
            if self.issue_interval > 0 {
                self.clock.wait_ticks(self.issue_interval).await;
            }
        }
        Ok(())
    }
}
