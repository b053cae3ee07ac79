// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Bounded table of the transactions in flight through the bridge.
//!
//! Each entry moves through
//! `Issued -> AwaitingDeviceCompletion -> Completing -> (removed)`, or to
//! `Failed` if its deadline passes first. The tracker decides which finished
//! entry is delivered next:
//!  - [Relaxed](OrderingPolicy::Relaxed): the order entries finished in.
//!  - [Strict](OrderingPolicy::Strict): the order entries were admitted in.
//!
//! The tracker has no notion of simulated time passing. The bridge tells it
//! when things happen.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use cxl_engine::time::clock::ClockTick;
use cxl_engine::types::SimError;
use thiserror::Error;

use crate::bridge::config::OrderingPolicy;
use crate::protocol::DeviceRequest;
use crate::transaction::{MemoryRequest, MemoryResponse, TransactionId};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    Issued,
    AwaitingDeviceCompletion,
    Completing,
    Failed,
}

impl EntryState {
    /// True once the entry has a response ready for the host.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        matches!(self, EntryState::Completing | EntryState::Failed)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("transaction {0} is already in flight")]
    DuplicateId(TransactionId),

    #[error("transaction {0} timed out and its late response is still expected")]
    Quarantined(TransactionId),

    #[error("all {0} entries are in use")]
    Full(usize),

    #[error("transaction {0} is blocking in-order delivery")]
    HeadOfLineBlocked(TransactionId),

    #[error("no transaction {0} in flight")]
    UnknownId(TransactionId),

    #[error("transaction {id} is {state:?}")]
    UnexpectedState { id: TransactionId, state: EntryState },

    #[error("transaction {id} was reused, dispatch {sequence} is stale")]
    StaleDispatch { id: TransactionId, sequence: u64 },
}

impl From<TrackerError> for SimError {
    fn from(e: TrackerError) -> Self {
        SimError(e.to_string())
    }
}

/// A newly admitted entry.
#[derive(Debug)]
pub struct Admitted {
    /// Identifies this use of the transaction id.
    pub sequence: u64,

    /// Set once the entry's deadline stops mattering.
    pub watchdog: Rc<Cell<bool>>,
}

/// What a device completion did to the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Completion {
    /// Matched an entry which is now `Completing`.
    Matched,
    /// Belonged to a transaction that had already timed out.
    LateDiscarded,
}

#[derive(Debug)]
pub struct InFlightEntry {
    pub request: MemoryRequest,
    pub device_request: DeviceRequest,
    pub state: EntryState,
    pub deadline: ClockTick,
    pub admitted_at: ClockTick,

    /// Position in admission order.
    pub sequence: u64,

    response: Option<MemoryResponse>,
    deliver_at: ClockTick,

    /// Set once the deadline no longer matters.
    watchdog_released: Rc<Cell<bool>>,
}

impl InFlightEntry {
    #[must_use]
    pub fn response(&self) -> Option<&MemoryResponse> {
        self.response.as_ref()
    }

    #[must_use]
    pub fn into_response(self) -> Option<MemoryResponse> {
        self.response
    }

    #[must_use]
    pub fn deliver_at(&self) -> ClockTick {
        self.deliver_at
    }
}

pub struct TransactionTracker {
    capacity: usize,
    ordering: OrderingPolicy,
    entries: HashMap<TransactionId, InFlightEntry>,
    admission_order: VecDeque<TransactionId>,
    finish_order: VecDeque<TransactionId>,
    quarantine: HashSet<TransactionId>,
    next_sequence: u64,
}

impl TransactionTracker {
    #[must_use]
    pub fn new(capacity: usize, ordering: OrderingPolicy) -> Self {
        Self {
            capacity,
            ordering,
            entries: HashMap::with_capacity(capacity),
            admission_order: VecDeque::with_capacity(capacity),
            finish_order: VecDeque::with_capacity(capacity),
            quarantine: HashSet::new(),
            next_sequence: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn ordering(&self) -> OrderingPolicy {
        self.ordering
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    #[must_use]
    pub fn get(&self, id: TransactionId) -> Option<&InFlightEntry> {
        self.entries.get(&id)
    }

    #[must_use]
    pub fn is_quarantined(&self, id: TransactionId) -> bool {
        self.quarantine.contains(&id)
    }

    /// Oldest entry, if it is unfinished while a younger one has finished.
    #[must_use]
    pub fn blocked_head(&self) -> Option<TransactionId> {
        let head = *self.admission_order.front()?;
        let head_finished = self
            .entries
            .get(&head)
            .is_some_and(|entry| entry.state.is_finished());
        if !head_finished && !self.finish_order.is_empty() {
            Some(head)
        } else {
            None
        }
    }

    /// Check whether a transaction with `id` could be admitted now.
    pub fn check_admission(&self, id: TransactionId) -> Result<(), TrackerError> {
        if self.entries.contains_key(&id) {
            return Err(TrackerError::DuplicateId(id));
        }
        if self.quarantine.contains(&id) {
            return Err(TrackerError::Quarantined(id));
        }
        if self.is_full() {
            return Err(TrackerError::Full(self.capacity));
        }
        if self.ordering == OrderingPolicy::Strict {
            if let Some(head) = self.blocked_head() {
                return Err(TrackerError::HeadOfLineBlocked(head));
            }
        }
        Ok(())
    }

    /// Create an `Issued` entry.
    pub fn admit(
        &mut self,
        request: MemoryRequest,
        device_request: DeviceRequest,
        now: ClockTick,
        deadline: ClockTick,
    ) -> Result<Admitted, TrackerError> {
        let id = request.transaction_id;
        self.check_admission(id)?;

        let sequence = self.next_sequence;
        let watchdog_released = Rc::new(Cell::new(false));
        let entry = InFlightEntry {
            request,
            device_request,
            state: EntryState::Issued,
            deadline,
            admitted_at: now,
            sequence,
            response: None,
            deliver_at: deadline,
            watchdog_released: watchdog_released.clone(),
        };
        self.next_sequence += 1;
        self.entries.insert(id, entry);
        self.admission_order.push_back(id);
        Ok(Admitted {
            sequence,
            watchdog: watchdog_released,
        })
    }

    /// The request admitted as `sequence` has been handed to the device.
    ///
    /// Fails if `id` has since timed out and been reused by a later request.
    pub fn mark_dispatched(
        &mut self,
        id: TransactionId,
        sequence: u64,
    ) -> Result<(), TrackerError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or(TrackerError::UnknownId(id))?;
        if entry.sequence != sequence {
            return Err(TrackerError::StaleDispatch { id, sequence });
        }
        if entry.state != EntryState::Issued {
            return Err(TrackerError::UnexpectedState {
                id,
                state: entry.state,
            });
        }
        entry.state = EntryState::AwaitingDeviceCompletion;
        Ok(())
    }

    /// Match a translated device completion to its entry.
    ///
    /// The response becomes deliverable at `deliver_at`.
    pub fn complete(
        &mut self,
        response: MemoryResponse,
        deliver_at: ClockTick,
    ) -> Result<Completion, TrackerError> {
        let id = response.transaction_id;
        if let Some(entry) = self.entries.get_mut(&id) {
            return match entry.state {
                EntryState::AwaitingDeviceCompletion => {
                    entry.state = EntryState::Completing;
                    entry.response = Some(response);
                    entry.deliver_at = deliver_at;
                    entry.watchdog_released.set(true);
                    self.finish_order.push_back(id);
                    Ok(Completion::Matched)
                }
                EntryState::Failed if self.quarantine.remove(&id) => Ok(Completion::LateDiscarded),
                state => Err(TrackerError::UnexpectedState { id, state }),
            };
        }

        if self.quarantine.remove(&id) {
            Ok(Completion::LateDiscarded)
        } else {
            Err(TrackerError::UnknownId(id))
        }
    }

    /// Fail `id` with a timeout response if it is still waiting.
    ///
    /// Returns whether the entry was failed.
    pub fn expire(&mut self, id: TransactionId, now: ClockTick) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        match entry.state {
            EntryState::Issued | EntryState::AwaitingDeviceCompletion => {
                if entry.state == EntryState::AwaitingDeviceCompletion {
                    // The device still owes a response
                    self.quarantine.insert(id);
                }
                entry.state = EntryState::Failed;
                entry.response = Some(MemoryResponse::timeout(id, now));
                entry.deliver_at = now;
                entry.watchdog_released.set(true);
                self.finish_order.push_back(id);
                true
            }
            EntryState::Completing | EntryState::Failed => false,
        }
    }

    /// The next entry to deliver and the earliest time it may be delivered.
    #[must_use]
    pub fn next_delivery(&self) -> Option<(TransactionId, ClockTick)> {
        let id = match self.ordering {
            OrderingPolicy::Relaxed => *self.finish_order.front()?,
            OrderingPolicy::Strict => *self.admission_order.front()?,
        };
        let entry = self.entries.get(&id)?;
        if entry.state.is_finished() {
            Some((id, entry.deliver_at))
        } else {
            None
        }
    }

    /// Remove an entry, typically once its response has been delivered.
    pub fn remove(&mut self, id: TransactionId) -> Result<InFlightEntry, TrackerError> {
        let entry = self
            .entries
            .remove(&id)
            .ok_or(TrackerError::UnknownId(id))?;
        self.admission_order.retain(|&other| other != id);
        self.finish_order.retain(|&other| other != id);
        entry.watchdog_released.set(true);
        Ok(entry)
    }

    /// Forget all timed-out ids. Returns how many there were.
    pub fn clear_quarantine(&mut self) -> usize {
        let num_cleared = self.quarantine.len();
        self.quarantine.clear();
        num_cleared
    }
}
