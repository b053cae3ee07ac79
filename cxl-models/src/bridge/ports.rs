// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The two sides of the bridge.
//!
//! The host submits requests synchronously through [RequestResponder] and
//! gets its answer straight away as an [Admission]. Responses come back later
//! on the [CpuSidePort]. The [MemSidePort] carries CXL.mem messages to and
//! from the device.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use cxl_engine::events::repeated::Repeated;
use cxl_engine::port::{InPort, OutPort, PortStateResult};
use cxl_engine::types::{SimError, SimResult};
use cxl_track::entity::Entity;
use cxl_track::{Unique, exit};

use crate::bridge::translate::TranslateError;
use crate::protocol::{DeviceRequest, DeviceResponse};
use crate::transaction::{MemoryRequest, MemoryResponse};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Some of the access lies outside the CXL-mapped range.
    OutOfRange,
    Unsupported(TranslateError),
    /// No free tracker entry, or in-order delivery is stalled.
    Busy,
    /// The transaction id is in use or awaiting a late response.
    DuplicateId,
    /// A protocol violation has occurred and the bridge needs a reset.
    Faulted,
}

impl RejectReason {
    /// Whether the same request may succeed once the bridge signals a retry.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, RejectReason::Busy | RejectReason::Faulted)
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::OutOfRange => write!(f, "out of range"),
            RejectReason::Unsupported(e) => write!(f, "unsupported: {e}"),
            RejectReason::Busy => write!(f, "busy"),
            RejectReason::DuplicateId => write!(f, "duplicate id"),
            RejectReason::Faulted => write!(f, "faulted"),
        }
    }
}

/// The result of offering a request to the bridge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    /// The request is handed back untouched.
    Rejected {
        reason: RejectReason,
        request: MemoryRequest,
    },
}

impl Admission {
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Admission::Accepted)
    }

    #[must_use]
    pub fn reason(&self) -> Option<&RejectReason> {
        match self {
            Admission::Accepted => None,
            Admission::Rejected { reason, .. } => Some(reason),
        }
    }
}

/// Implemented by anything that accepts host requests.
pub trait RequestResponder {
    fn receive_request(&self, request: MemoryRequest) -> Admission;

    /// Fires whenever a transient rejection may have cleared.
    fn retry_event(&self) -> Repeated<()>;
}

/// Host facing side. Delivers responses.
pub struct CpuSidePort {
    pub entity: Rc<Entity>,
    tx: RefCell<OutPort<MemoryResponse>>,
}

impl CpuSidePort {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let tx = OutPort::new(&entity, "tx");
        Self {
            entity,
            tx: RefCell::new(tx),
        }
    }

    pub fn connect(&self, port_state: PortStateResult<MemoryResponse>) -> SimResult {
        self.tx.borrow_mut().connect(port_state)
    }

    pub async fn send_response(&self, response: MemoryResponse) -> SimResult {
        exit!(self.entity ; response.id());
        let put = self.tx.borrow().put(response)?;
        put.await;
        Ok(())
    }
}

/// Device facing side. Sends M2S requests and receives S2M responses.
pub struct MemSidePort {
    pub entity: Rc<Entity>,
    tx: RefCell<OutPort<DeviceRequest>>,
    rx: InPort<DeviceResponse>,
}

impl MemSidePort {
    #[must_use]
    pub fn new(parent: &Rc<Entity>, name: &str) -> Self {
        let entity = Rc::new(Entity::new(parent, name));
        let tx = OutPort::new(&entity, "tx");
        let rx = InPort::new(&entity, "rx");
        Self {
            entity,
            tx: RefCell::new(tx),
            rx,
        }
    }

    pub fn connect(&self, port_state: PortStateResult<DeviceRequest>) -> SimResult {
        self.tx.borrow_mut().connect(port_state)
    }

    pub fn port_response(&self) -> PortStateResult<DeviceResponse> {
        self.rx.state()
    }

    pub async fn send_request(&self, request: DeviceRequest) -> SimResult {
        exit!(self.entity ; request.id());
        let put = self.tx.borrow().put(request)?;
        put.await;
        Ok(())
    }

    pub async fn receive_response(&self) -> Result<DeviceResponse, SimError> {
        Ok(self.rx.get()?.await)
    }
}
